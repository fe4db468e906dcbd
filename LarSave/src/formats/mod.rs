//! File format handlers for the Larian savegame container trio

pub mod lsf;
pub mod lsx;
