//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! Reads concatenated GRIB2 messages, exposes their identification, grid and
//! product metadata, and decodes field values on demand.

pub mod error;
pub mod message;
pub mod reader;
pub mod sections;
pub mod tables;
pub mod unpacking;

pub use error::{Grib2Error, Grib2Result};
pub use message::{Grib2Message, SURFACE_ISOBARIC};
pub use reader::Grib2Reader;
pub use sections::{FixedSurface, GridDefinition, ScanMode};
pub use tables::{Grib2Tables, LevelDescription};
