use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use bevy_ecs::world::World;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ecs::resources::{EventLog, LoggedEvent, TradeEngineHandle};
use crate::trade::TradeSnapshot;

pub const ROUTES_FILE: &str = "routes.jsonl";
pub const HUBS_FILE: &str = "hubs.jsonl";
pub const MARKETS_FILE: &str = "markets.jsonl";
pub const EVENTS_FILE: &str = "events.jsonl";

/// Write an iterator of serializable items to a JSONL file (one JSON object per line).
fn write_jsonl<T: Serialize>(file: File, items: impl Iterator<Item = T>) -> io::Result<()> {
    let mut writer = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut writer, &item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Read a JSONL file back, skipping blank lines. A missing file reads as empty.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut items = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str(&line)?);
    }
    Ok(items)
}

/// Write engine state to JSONL files in the given output directory.
///
/// Creates the output directory if it does not exist and replaces any previous
/// snapshot there. Writes 3 files:
/// - `routes.jsonl`: one TradeRoute per line
/// - `hubs.jsonl`: one TradeHub per line
/// - `markets.jsonl`: one MarketSnapshot per line
pub fn flush_snapshot_to_jsonl(snapshot: &TradeSnapshot, output_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(output_dir)?;
    write_jsonl(
        File::create(output_dir.join(ROUTES_FILE))?,
        snapshot.routes.iter(),
    )?;
    write_jsonl(
        File::create(output_dir.join(HUBS_FILE))?,
        snapshot.hubs.iter(),
    )?;
    write_jsonl(
        File::create(output_dir.join(MARKETS_FILE))?,
        snapshot.markets.iter(),
    )?;
    Ok(())
}

/// Append logged events to `events.jsonl`, so periodic flushes build one history.
pub fn flush_events_to_jsonl(events: &[LoggedEvent], output_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(output_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_dir.join(EVENTS_FILE))?;
    write_jsonl(file, events.iter())
}

pub fn read_snapshot_from_jsonl(input_dir: &Path) -> io::Result<TradeSnapshot> {
    Ok(TradeSnapshot {
        routes: read_jsonl(&input_dir.join(ROUTES_FILE))?,
        hubs: read_jsonl(&input_dir.join(HUBS_FILE))?,
        markets: read_jsonl(&input_dir.join(MARKETS_FILE))?,
    })
}

pub fn read_events_from_jsonl(input_dir: &Path) -> io::Result<Vec<LoggedEvent>> {
    read_jsonl(&input_dir.join(EVENTS_FILE))
}

/// Flush an app's engine snapshot and event log, then clear the log.
///
/// The log is only cleared once everything was written.
pub fn flush_world_to_jsonl(world: &mut World, output_dir: &Path) -> io::Result<()> {
    if let Some(engine) = world.get_resource::<TradeEngineHandle>() {
        flush_snapshot_to_jsonl(&engine.0.snapshot(), output_dir)?;
    }
    if let Some(mut log) = world.get_resource_mut::<EventLog>() {
        flush_events_to_jsonl(&log.events, output_dir)?;
        log.clear();
    }
    tracing::debug!(dir = %output_dir.display(), "flushed trade state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_read_as_an_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = read_snapshot_from_jsonl(dir.path()).unwrap();
        assert_eq!(snapshot, TradeSnapshot::default());
        assert!(read_events_from_jsonl(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn garbage_lines_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(HUBS_FILE), "{not json}\n").unwrap();
        let err = read_snapshot_from_jsonl(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
