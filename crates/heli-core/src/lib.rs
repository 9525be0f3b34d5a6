pub mod classifier;
pub mod geo;
pub mod models;
pub mod region;
pub mod viewport;

pub use classifier::{classify, AircraftEvidence, Classification, ClassifierPolicy, EvidenceTier};
pub use geo::{box_to_center_radius, distance_km, CenterRadius};
pub use models::{BoundingBox, BoundingBoxError, FlightRecord, FlightStatus};
pub use region::{RegionKey, RegionQuantizer};
pub use viewport::clip;
