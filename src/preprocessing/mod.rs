pub mod aligner;
pub mod anchors;
pub mod framing;
pub mod preprocessor;
pub mod synchronizer;
