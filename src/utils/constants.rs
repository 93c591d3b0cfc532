/// Bundle layout
pub const DATABASE_EXTENSION: &str = "db";
pub const LICENSE_EXTENSION: &str = "LICENSE";
pub const DATA_DIR: &str = "pkl";
pub const INDEX_STEM: &str = "index";

/// Tables and statements
pub const INSERT_DATA_SQL: &str = "INSERT INTO data VALUES (?1, ?2, ?3, ?4, ?5)";
pub const INSERT_MEASUREMENT_SQL: &str = "INSERT INTO measurement VALUES (?1, ?2, ?3)";
pub const INSERT_FLAG_SQL: &str = "INSERT INTO data VALUES (?1, ?2, ?3, NULL, ?4)";
pub const SELECT_META_SQL: &str = "SELECT id, name FROM meta";
pub const META_TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'meta'";

/// Indices built on `data` once loading is done: (name, columns)
pub const DATA_INDICES: &[(&str, &str)] = &[
    ("param_index", "param, sta, date"),
    ("date_index", "date"),
    ("sta_index", "sta"),
];

/// Meta id used for flags missing from the `meta` table
pub const UNSPECIFIED_META_ID: u32 = 0;

/// Answers accepted at the license prompt
pub const ACCEPT_ANSWERS: &[&str] = &["yes", "y"];
