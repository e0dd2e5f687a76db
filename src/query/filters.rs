use chrono_tz::Tz;

/// Resolved date range, timezone and dimension filters for a weekly query.
#[derive(Debug, Clone)]
pub struct WeeklyFilters {
    /// Inclusive start, `YYYY-MM-DD`.
    pub start_date: String,
    /// Exclusive end, `YYYY-MM-DD`.
    pub end_date: String,
    pub timezone: Tz,
    pub url_path: Option<String>,
    pub referrer: Option<String>,
    pub title: Option<String>,
    pub query: Option<String>,
    pub event_name: Option<String>,
    pub hostname: Option<String>,
    pub tag: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

impl WeeklyFilters {
    /// Filters covering `[start_date, end_date)` in UTC with no dimension filters.
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
            timezone: Tz::UTC,
            url_path: None,
            referrer: None,
            title: None,
            query: None,
            event_name: None,
            hostname: None,
            tag: None,
            browser: None,
            os: None,
            device: None,
            country: None,
            region: None,
            city: None,
        }
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Value set for a given filter column, if any.
    pub fn value(&self, column: FilterColumn) -> Option<&str> {
        let value = match column {
            FilterColumn::UrlPath => &self.url_path,
            FilterColumn::Referrer => &self.referrer,
            FilterColumn::Title => &self.title,
            FilterColumn::Query => &self.query,
            FilterColumn::EventName => &self.event_name,
            FilterColumn::Hostname => &self.hostname,
            FilterColumn::Tag => &self.tag,
            FilterColumn::Browser => &self.browser,
            FilterColumn::Os => &self.os,
            FilterColumn::Device => &self.device,
            FilterColumn::Country => &self.country,
            FilterColumn::Region => &self.region,
            FilterColumn::City => &self.city,
        };
        value.as_deref()
    }

    /// True when any per-event filter is set. Such queries can't be answered
    /// from the hourly session rollup.
    pub fn has_event_filters(&self) -> bool {
        FilterColumn::ALL
            .iter()
            .any(|&c| c.is_event_column() && self.value(c).is_some())
    }

    /// Whether bucketing can use stored timestamps without conversion.
    pub fn is_utc(&self) -> bool {
        self.timezone == Tz::UTC
    }

    /// Stable string covering every field, used for cache keys. Values are
    /// JSON-encoded so separators inside a value can't alias another filter.
    pub fn cache_key(&self) -> String {
        let set: Vec<(&str, &str)> = FilterColumn::ALL
            .iter()
            .filter_map(|&c| self.value(c).map(|v| (c.param_name(), v)))
            .collect();
        serde_json::json!([
            self.start_date,
            self.end_date,
            self.timezone.name(),
            set
        ])
        .to_string()
    }
}

/// Filterable columns of `website_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    UrlPath,
    Referrer,
    Title,
    Query,
    EventName,
    Hostname,
    Tag,
    Browser,
    Os,
    Device,
    Country,
    Region,
    City,
}

impl FilterColumn {
    pub const ALL: [Self; 13] = [
        Self::UrlPath,
        Self::Referrer,
        Self::Title,
        Self::Query,
        Self::EventName,
        Self::Hostname,
        Self::Tag,
        Self::Browser,
        Self::Os,
        Self::Device,
        Self::Country,
        Self::Region,
        Self::City,
    ];

    pub const fn column_name(self) -> &'static str {
        match self {
            Self::UrlPath => "url_path",
            Self::Referrer => "referrer_domain",
            Self::Title => "page_title",
            Self::Query => "url_query",
            Self::EventName => "event_name",
            Self::Hostname => "hostname",
            Self::Tag => "tag",
            Self::Browser => "browser",
            Self::Os => "os",
            Self::Device => "device",
            Self::Country => "country",
            Self::Region => "region",
            Self::City => "city",
        }
    }

    /// Name used for the query-string parameter and the ClickHouse placeholder.
    pub const fn param_name(self) -> &'static str {
        match self {
            Self::UrlPath => "url_path",
            Self::Referrer => "referrer",
            Self::Title => "title",
            Self::Query => "query",
            Self::EventName => "event_name",
            Self::Hostname => "hostname",
            Self::Tag => "tag",
            Self::Browser => "browser",
            Self::Os => "os",
            Self::Device => "device",
            Self::Country => "country",
            Self::Region => "region",
            Self::City => "city",
        }
    }

    /// Event columns vary per event; the rest are fixed for a session.
    pub const fn is_event_column(self) -> bool {
        matches!(
            self,
            Self::UrlPath
                | Self::Referrer
                | Self::Title
                | Self::Query
                | Self::EventName
                | Self::Hostname
                | Self::Tag
        )
    }
}

/// Placeholder syntax of the target backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Positional `?` placeholders.
    DuckDb,
    /// Named `{name:String}` placeholders.
    ClickHouse,
}

/// Rendered `AND col = <placeholder>` lines with their bound values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterClause {
    pub sql: String,
    /// `(param name, value)` in placeholder order.
    pub params: Vec<(String, String)>,
}

impl FilterClause {
    pub fn build(filters: &WeeklyFilters, dialect: Dialect) -> Self {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        for column in FilterColumn::ALL {
            let Some(value) = filters.value(column) else {
                continue;
            };
            let col = column.column_name();
            let name = format!("filter_{}", column.param_name());
            match dialect {
                Dialect::DuckDb => clauses.push(format!("AND {col} = ?")),
                Dialect::ClickHouse => clauses.push(format!("AND {col} = {{{name}:String}}")),
            }
            params.push((name, value.to_string()));
        }

        Self {
            sql: clauses.join("\n           "),
            params,
        }
    }

    /// Bound values only, in placeholder order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(_, v)| v.as_str())
    }
}

/// Parse an IANA timezone name. `utc` is accepted in any case.
pub fn parse_timezone(name: &str) -> Option<Tz> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("utc") {
        return Some(Tz::UTC);
    }
    name.parse::<Tz>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filters_renders_empty() {
        let filters = WeeklyFilters::new("2024-01-01", "2024-02-01");
        let clause = FilterClause::build(&filters, Dialect::DuckDb);
        assert!(clause.sql.is_empty());
        assert!(clause.params.is_empty());
        assert!(!filters.has_event_filters());
    }

    #[test]
    fn test_duckdb_placeholders() {
        let mut filters = WeeklyFilters::new("2024-01-01", "2024-02-01");
        filters.url_path = Some("/pricing".to_string());
        filters.country = Some("US".to_string());
        let clause = FilterClause::build(&filters, Dialect::DuckDb);
        assert!(clause.sql.contains("AND url_path = ?"));
        assert!(clause.sql.contains("AND country = ?"));
        assert_eq!(clause.values().collect::<Vec<_>>(), vec!["/pricing", "US"]);
    }

    #[test]
    fn test_clickhouse_placeholders() {
        let mut filters = WeeklyFilters::new("2024-01-01", "2024-02-01");
        filters.browser = Some("Firefox".to_string());
        let clause = FilterClause::build(&filters, Dialect::ClickHouse);
        assert_eq!(clause.sql, "AND browser = {filter_browser:String}");
        assert_eq!(
            clause.params,
            vec![("filter_browser".to_string(), "Firefox".to_string())]
        );
    }

    #[test]
    fn test_values_never_reach_sql() {
        let mut filters = WeeklyFilters::new("2024-01-01", "2024-02-01");
        filters.title = Some("x'; DROP TABLE website_event; --".to_string());
        for dialect in [Dialect::DuckDb, Dialect::ClickHouse] {
            let clause = FilterClause::build(&filters, dialect);
            assert!(!clause.sql.contains("DROP"));
        }
    }

    #[test]
    fn test_event_vs_session_filters() {
        let mut filters = WeeklyFilters::new("2024-01-01", "2024-02-01");
        filters.os = Some("Linux".to_string());
        assert!(!filters.has_event_filters());
        filters.event_name = Some("signup".to_string());
        assert!(filters.has_event_filters());
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("utc"), Some(Tz::UTC));
        assert_eq!(parse_timezone("UTC"), Some(Tz::UTC));
        assert_eq!(
            parse_timezone("America/New_York"),
            Some(chrono_tz::America::New_York)
        );
        assert!(parse_timezone("Mars/Olympus_Mons").is_none());
        assert!(parse_timezone("UTC'); DROP TABLE x; --").is_none());
    }

    #[test]
    fn test_cache_key_distinguishes_filters() {
        let a = WeeklyFilters::new("2024-01-01", "2024-02-01");
        let mut b = a.clone();
        b.city = Some("Berlin".to_string());
        let c = a.clone().with_timezone(chrono_tz::Europe::Berlin);
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
        assert_eq!(a.cache_key(), a.clone().cache_key());
    }

    #[test]
    fn test_cache_key_separator_in_value_does_not_alias() {
        let base = WeeklyFilters::new("2024-01-01", "2024-02-01");
        let mut split = base.clone();
        split.region = Some("a".to_string());
        split.city = Some("b".to_string());
        let mut joined = base;
        joined.region = Some("a:city=b".to_string());
        assert_ne!(split.cache_key(), joined.cache_key());

        let mut quoted = WeeklyFilters::new("2024-01-01", "2024-02-01");
        quoted.region = Some(r#"a","city","b"#.to_string());
        assert_ne!(split.cache_key(), quoted.cache_key());
    }
}
