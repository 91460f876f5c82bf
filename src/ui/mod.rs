pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, error, header, info, section, step, success, summary_row, timing, warn};
pub use table::{TableBuilder, stats_table, steps_table, transform_table};
pub use theme::{Theme, theme};
