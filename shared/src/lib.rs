pub mod cluster;
pub mod colors;
pub mod csv;
pub mod dataset;
pub mod detail;
pub mod geo;
pub mod payload;
pub mod record;
pub mod style;

pub use cluster::{ClusterChild, ClusterSize, ClusterSummary, summarize};
pub use dataset::{DatasetConfig, DatasetKind};
pub use detail::{DetailRecord, Metric};
pub use geo::{LatLng, LatLngBounds};
pub use payload::{Collection, PayloadError, parse_collection, parse_detail};
pub use record::{EntityId, Record};
pub use style::{DatasetStyle, MarkerPaint, MarkerShape};
