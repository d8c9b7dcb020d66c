//! SQL scalar functions registered on every pin store connection.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// Unicode-aware lowercase fold used by case-insensitive name matching.
///
/// SQLite's `lower()` and `NOCASE` only fold ASCII.
pub(crate) const FOLD_FN: &str = "pin_fold";

pub(crate) fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value = ctx.get::<Option<String>>(0)?;
            Ok(value.map(|text| text.to_lowercase()))
        },
    )
}
