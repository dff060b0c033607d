pub(crate) mod resolve;
mod selection;
mod unit;

pub use selection::RootSelection;
pub use unit::{Job, ResultRecord, Sample, Test, Unit, UnitId, UnitKind};
