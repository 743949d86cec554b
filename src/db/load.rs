use serde::Serialize;
use sqlx::PgPool;

use crate::ecs::resources::LoggedEvent;
use crate::model::{RegionId, TradeRoute};
use crate::trade::TradeSnapshot;

/// Load a trade snapshot into Postgres using COPY FROM STDIN (text format).
///
/// Routes keep their full record as JSONB next to the queryable columns, so the
/// snapshot can be rebuilt from the table alone.
pub async fn load_snapshot(pool: &PgPool, snapshot: &TradeSnapshot) -> Result<(), sqlx::Error> {
    // Routes
    {
        let mut buf = String::new();
        for r in &snapshot.routes {
            push_route(&mut buf, r)?;
        }
        copy_in(pool, include_str!("../../sql/copy_trade_routes.sql"), &buf).await?;
    }

    // Hubs
    {
        let mut buf = String::new();
        for h in &snapshot.hubs {
            let specializations: Vec<&str> =
                h.specialized_resources.iter().map(|r| r.as_str()).collect();
            buf.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                h.region,
                escape(&h.name),
                h.kind.as_str(),
                h.level,
                float(h.capacity),
                float(h.current_utilization),
                float(h.reputation),
                float(h.security_rating),
                array(specializations.iter()),
                h.established_at.as_minutes(),
            ));
        }
        copy_in(pool, include_str!("../../sql/copy_trade_hubs.sql"), &buf).await?;
    }

    // Markets
    {
        let mut buf = String::new();
        for m in &snapshot.markets {
            buf.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                m.region,
                m.resource.as_str(),
                float(m.base_price),
                float(m.current_price),
                float(m.supply),
                float(m.demand),
                m.trend.as_str(),
                float(m.volatility),
                m.last_updated.as_minutes(),
            ));
        }
        copy_in(pool, include_str!("../../sql/copy_markets.sql"), &buf).await?;
    }

    tracing::info!(
        routes = snapshot.routes.len(),
        hubs = snapshot.hubs.len(),
        markets = snapshot.markets.len(),
        "snapshot loaded"
    );
    Ok(())
}

/// Load logged events. Ids must not already be present in `trade_events`.
pub async fn load_events(pool: &PgPool, events: &[LoggedEvent]) -> Result<(), sqlx::Error> {
    let mut buf = String::new();
    for e in events {
        let route = e
            .route
            .map(|id| escape(&id.to_string()))
            .unwrap_or_else(|| "\\N".to_string());
        buf.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            e.id,
            escape(&e.kind),
            e.timestamp.as_minutes(),
            route,
            escape(&e.description),
            escape(&json(&e.event)?),
        ));
    }
    copy_in(pool, include_str!("../../sql/copy_trade_events.sql"), &buf).await
}

fn push_route(buf: &mut String, r: &TradeRoute) -> Result<(), sqlx::Error> {
    let path = array(r.path.iter().map(RegionId::to_string));
    buf.push_str(&format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
        escape(&r.id.to_string()),
        r.source,
        r.destination,
        r.resource.as_str(),
        r.kind.as_str(),
        r.status.as_str(),
        path,
    ));
    for value in [
        r.distance_km,
        r.safety_rating,
        r.efficiency_rating,
        r.current_volume,
        r.profitability(),
        r.expected_monthly_profit(),
        r.total_goods_moved,
        r.lifetime_profit,
    ] {
        buf.push_str(&float(value));
        buf.push('\t');
    }
    buf.push_str(&format!(
        "{}\t{}\t{}\n",
        r.disruption_count,
        r.established_at.as_minutes(),
        escape(&json(r)?),
    ));
    Ok(())
}

/// Execute a COPY FROM STDIN with the given text-format payload.
async fn copy_in(pool: &PgPool, statement: &str, data: &str) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let mut copy = conn.copy_in_raw(statement).await?;
    copy.send(data.as_bytes()).await?;
    copy.finish().await?;
    Ok(())
}

/// Escape a string for Postgres COPY text format.
/// Backslash must be escaped first, then the special whitespace characters.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a float the way Postgres parses it; Rust prints infinities as `inf`.
fn float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "Infinity".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        v.to_string()
    }
}

/// Render a Postgres array literal of plain (comma- and brace-free) elements.
fn array<T: ToString>(items: impl Iterator<Item = T>) -> String {
    let mut out = String::from("{");
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&item.to_string());
    }
    out.push('}');
    out
}

fn json<T: Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_copy_specials() {
        assert_eq!(escape("a\tb\nc\\d"), "a\\tb\\nc\\\\d");
    }

    #[test]
    fn floats_use_postgres_spellings() {
        assert_eq!(float(1.5), "1.5");
        assert_eq!(float(f64::INFINITY), "Infinity");
        assert_eq!(float(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(float(f64::NAN), "NaN");
    }

    #[test]
    fn arrays_render_as_literals() {
        assert_eq!(array([1, 2, 3].iter()), "{1,2,3}");
        assert_eq!(array(std::iter::empty::<u8>()), "{}");
    }
}
