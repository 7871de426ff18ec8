pub mod analysis;
pub mod binning;
pub mod decay;
pub mod indicators;
pub mod merge;
pub mod multitau;
pub mod pie;
pub mod timetrace;
