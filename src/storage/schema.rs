use duckdb::Connection;

/// SQL statement to create the website events table.
///
/// Session attributes are denormalized onto every event so session filters
/// don't need a join.
pub const CREATE_WEBSITE_EVENT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS website_event (
    website_id      VARCHAR NOT NULL,
    session_id      VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL,
    event_name      VARCHAR,
    url_path        VARCHAR,
    url_query       VARCHAR,
    referrer_domain VARCHAR,
    page_title      VARCHAR,
    hostname        VARCHAR,
    tag             VARCHAR,
    browser         VARCHAR,
    os              VARCHAR,
    device          VARCHAR,
    country         VARCHAR(2),
    region          VARCHAR,
    city            VARCHAR
)
";

/// Index backing the `website_id` + time range predicate of every query.
pub const CREATE_WEBSITE_EVENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS website_event_website_created_idx
    ON website_event (website_id, created_at)
";

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch(CREATE_WEBSITE_EVENT_TABLE)?;
    conn.execute_batch(CREATE_WEBSITE_EVENT_INDEX)?;
    Ok(())
}

/// Install and load the ICU extension, needed for non-UTC bucketing.
pub fn load_icu_extension(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch("INSTALL icu; LOAD icu;")?;
    Ok(())
}
