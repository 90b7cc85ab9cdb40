use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Booking, BookingStatus, Salon};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BOOKING_COLUMNS: &str = "id, salon_id, service_name, staff_member, start_time, status, \
     customer_name, customer_email, customer_phone, is_manual, price, reminder_sent, \
     completed_at, created_at, updated_at";

fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .with_context(|| format!("invalid stored timestamp: {s}"))?;
    Ok(naive.and_utc())
}

// ── Salons ──

pub fn get_salon(conn: &Connection, id: &str) -> anyhow::Result<Option<Salon>> {
    let row = conn
        .query_row(
            "SELECT id, name, owner_email, logo_url, admin_pin, timezone, shop_config, services, staff
             FROM salons WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, owner_email, logo_url, admin_pin, timezone, config, services, staff)) = row
    else {
        return Ok(None);
    };

    Ok(Some(Salon {
        shop_config: serde_json::from_str(&config)
            .with_context(|| format!("invalid shop config for salon {id}"))?,
        services: serde_json::from_str(&services)
            .with_context(|| format!("invalid service catalog for salon {id}"))?,
        staff: serde_json::from_str(&staff)
            .with_context(|| format!("invalid staff list for salon {id}"))?,
        id,
        name,
        owner_email,
        logo_url,
        admin_pin,
        timezone,
    }))
}

pub fn save_salon(conn: &Connection, salon: &Salon) -> anyhow::Result<()> {
    salon.validate()?;
    let config = serde_json::to_string(&salon.shop_config)?;
    let services = serde_json::to_string(&salon.services)?;
    let staff = serde_json::to_string(&salon.staff)?;

    conn.execute(
        "INSERT INTO salons (id, name, owner_email, logo_url, admin_pin, timezone, shop_config, services, staff)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           owner_email = excluded.owner_email,
           logo_url = excluded.logo_url,
           admin_pin = excluded.admin_pin,
           timezone = excluded.timezone,
           shop_config = excluded.shop_config,
           services = excluded.services,
           staff = excluded.staff,
           updated_at = datetime('now')",
        params![
            salon.id,
            salon.name,
            salon.owner_email,
            salon.logo_url,
            salon.admin_pin,
            salon.timezone,
            config,
            services,
            staff,
        ],
    )?;
    Ok(())
}

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            booking.id,
            booking.salon_id,
            booking.service_name,
            booking.staff_member,
            fmt_ts(&booking.start_time),
            booking.status.as_str(),
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.is_manual,
            booking.price,
            booking.reminder_sent,
            booking.completed_at.as_ref().map(fmt_ts),
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, salon_id: &str, id: &str) -> anyhow::Result<Option<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE salon_id = ?1 AND id = ?2"
    ))?;
    let mut rows = stmt.query_map(params![salon_id, id], |row| Ok(parse_booking_row(row)))?;
    match rows.next() {
        Some(row) => Ok(Some(row??)),
        None => Ok(None),
    }
}

/// Pending and confirmed bookings starting in `[start, end)`.
pub fn get_blocking_bookings_in_range(
    conn: &Connection,
    salon_id: &str,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE salon_id = ?1 AND start_time >= ?2 AND start_time < ?3
           AND status IN ('Pending', 'Confirmed')
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(params![salon_id, fmt_ts(start), fmt_ts(end)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Non-terminal bookings from `from` onwards, optionally bounded by `until`.
pub fn get_active_bookings(
    conn: &Connection,
    salon_id: &str,
    from: &DateTime<Utc>,
    until: Option<&DateTime<Utc>>,
) -> anyhow::Result<Vec<Booking>> {
    // No upper bound sorts after any stored timestamp.
    let until = until.map(fmt_ts).unwrap_or_else(|| "9999-12-31 23:59:59".to_string());
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE salon_id = ?1 AND start_time >= ?2 AND start_time < ?3
           AND status NOT IN ('Completed', 'Cancelled', 'No-Show')
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(params![salon_id, fmt_ts(from), until], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Every booking starting in `[start, end)`, whatever its status.
pub fn get_bookings_in_period(
    conn: &Connection,
    salon_id: &str,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE salon_id = ?1 AND start_time >= ?2 AND start_time < ?3
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(params![salon_id, fmt_ts(start), fmt_ts(end)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    salon_id: &str,
    id: &str,
    status: BookingStatus,
    completed_at: Option<&DateTime<Utc>>,
) -> anyhow::Result<bool> {
    let now = fmt_ts(&Utc::now());
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, completed_at = COALESCE(?2, completed_at), updated_at = ?3
         WHERE salon_id = ?4 AND id = ?5",
        params![status.as_str(), completed_at.map(fmt_ts), now, salon_id, id],
    )?;
    Ok(count > 0)
}

/// Rewrites the editable fields of a booking; status and timestamps other than
/// `updated_at` are left alone.
pub fn update_booking_details(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           service_name = ?1,
           staff_member = ?2,
           start_time = ?3,
           customer_name = ?4,
           customer_email = ?5,
           customer_phone = ?6,
           price = ?7,
           reminder_sent = ?8,
           updated_at = ?9
         WHERE salon_id = ?10 AND id = ?11",
        params![
            booking.service_name,
            booking.staff_member,
            fmt_ts(&booking.start_time),
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.price,
            booking.reminder_sent,
            fmt_ts(&booking.updated_at),
            booking.salon_id,
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

// ── Reminders ──

/// Confirmed, not yet reminded bookings starting in `[from, to]`, across all salons.
pub fn get_due_reminders(
    conn: &Connection,
    from: &DateTime<Utc>,
    to: &DateTime<Utc>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'Confirmed' AND reminder_sent = 0
           AND start_time >= ?1 AND start_time <= ?2
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(params![fmt_ts(from), fmt_ts(to)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn mark_reminder_sent(conn: &Connection, id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET reminder_sent = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

// ── Report runs ──

pub fn get_last_report_run(
    conn: &Connection,
    salon_id: &str,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    let last: Option<String> = conn
        .query_row(
            "SELECT last_run_at FROM report_runs WHERE salon_id = ?1",
            params![salon_id],
            |row| row.get(0),
        )
        .optional()?;
    last.as_deref().map(parse_ts).transpose()
}

pub fn record_report_run(
    conn: &Connection,
    salon_id: &str,
    at: &DateTime<Utc>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO report_runs (salon_id, last_run_at) VALUES (?1, ?2)
         ON CONFLICT(salon_id) DO UPDATE SET last_run_at = excluded.last_run_at",
        params![salon_id, fmt_ts(at)],
    )?;
    Ok(())
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_time: String = row.get(4)?;
    let status: String = row.get(5)?;
    let completed_at: Option<String> = row.get(12)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(Booking {
        id: row.get(0)?,
        salon_id: row.get(1)?,
        service_name: row.get(2)?,
        staff_member: row.get(3)?,
        start_time: parse_ts(&start_time)?,
        status: BookingStatus::parse(&status)
            .with_context(|| format!("unknown booking status: {status}"))?,
        customer_name: row.get(6)?,
        customer_email: row.get(7)?,
        customer_phone: row.get(8)?,
        is_manual: row.get(9)?,
        price: row.get(10)?,
        reminder_sent: row.get(11)?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
