//! CLI commands of the market warehouse pipeline.

pub mod extract;
pub mod lake_status;
pub mod load;
pub mod serve;
pub mod warehouse;

pub use extract::{all_succeeded, print_extract_summary, run_extract, ExtractArgs};
pub use lake_status::{run_lake_status, LakeStatusArgs};
pub use load::{print_load_summary, run_load, LoadArgs};
pub use serve::{run_serve, ServeArgs};
pub use warehouse::{run_init_schema, run_validate};
