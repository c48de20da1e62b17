//! SQL schema for the showtime SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per logical key. key_digest is the SHA-256 of
-- (starts_at, cinema_name, movie_title, attributes, city); a plain
-- multi-column UNIQUE would let rows with a NULL city repeat.
CREATE TABLE IF NOT EXISTS showtime_facts (
    fact_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    showtime_id       TEXT    NOT NULL UNIQUE,
    movie_title       TEXT    NOT NULL,
    cinema_name       TEXT    NOT NULL,
    starts_at         TEXT    NOT NULL,   -- RFC 3339 UTC, microseconds
    booking_link      TEXT    NOT NULL,
    attributes        TEXT    NOT NULL,   -- JSON array, order preserved
    city              TEXT,
    key_digest        TEXT    NOT NULL UNIQUE,
    observation_count INTEGER NOT NULL CHECK (observation_count >= 1),
    created_at        TEXT    NOT NULL,
    updated_at        TEXT    NOT NULL
);

-- Derived; written only by the aggregate maintainer. key_digest is the key
-- the count was computed for, so a row whose fact has since moved to a new
-- key is detectable as stale.
CREATE TABLE IF NOT EXISTS showtime_aggregates (
    aggregate_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    fact_id           INTEGER NOT NULL UNIQUE
                        REFERENCES showtime_facts(fact_id) ON DELETE CASCADE,
    key_digest        TEXT    NOT NULL UNIQUE,
    observation_count INTEGER NOT NULL CHECK (observation_count >= 1),
    computed_at       TEXT    NOT NULL
);

-- Backstop for any write that moves a fact to a new key.
CREATE TRIGGER IF NOT EXISTS showtime_facts_rekey
AFTER UPDATE OF key_digest ON showtime_facts
WHEN OLD.key_digest <> NEW.key_digest
BEGIN
    DELETE FROM showtime_aggregates WHERE fact_id = OLD.fact_id;
END;

CREATE INDEX IF NOT EXISTS showtime_facts_starts_idx ON showtime_facts(starts_at);

PRAGMA user_version = 1;
";
