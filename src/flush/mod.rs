pub mod jsonl;

pub use jsonl::{
    EVENTS_FILE, HUBS_FILE, MARKETS_FILE, ROUTES_FILE, flush_events_to_jsonl,
    flush_snapshot_to_jsonl, flush_world_to_jsonl, read_events_from_jsonl,
    read_snapshot_from_jsonl,
};
