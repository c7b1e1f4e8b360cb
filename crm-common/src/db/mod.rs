//! Database schema, migrations and runtime settings

pub mod init;
pub mod migrations;
pub mod settings;

pub use init::{create_schema, init_database};
pub use migrations::{get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION};
pub use settings::{
    ensure_setting, get_setting, get_setting_raw, init_default_settings, set_setting,
    WorkloadThresholds,
};
