pub mod augmentation;
pub mod corpus;
pub mod time_stretch;
