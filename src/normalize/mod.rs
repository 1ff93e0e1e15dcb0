pub mod columns;
pub mod missing;
pub mod records;
pub mod table;
pub mod values;

pub use columns::{normalize_column_name, resolve_alias};
pub use missing::{require_values, MissingValuePolicy};
pub use records::{air_quality_from_table, air_quality_from_table_with, weather_from_table};
pub use table::{RawCell, RawTable};
pub use values::{parse_calendar_date, parse_number};
