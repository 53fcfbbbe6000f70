pub mod execute;
pub mod relink;
pub mod restore;

pub use execute::{import_data, import_document, IdMap, ImportError, ImportOutcome};
pub use relink::{parse_asset_name, relink_assets, RelinkSummary};
pub use restore::{
    restore_archive, RestoreError, RestoreEvent, RestoreObserver, RestorePhase, RestoreReport,
};
