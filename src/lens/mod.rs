//! Lens module
//!
//! Lenses combine lookup logic with output formatting so the same code serves
//! the CLI and any outer presentation layer.
//!
//! | Lens | Backed by |
//! |------|-----------|
//! | `RouteLens` | `RouteRepository` (current generation only) |
//! | `VendorLens` | `VendorRepository` |
//!
//! # Usage
//!
//! ```rust,ignore
//! use refdex::lens::bgp::{RouteLens, RouteQuery};
//! use refdex::lens::mac::VendorLens;
//! use refdex::lens::utils::OutputFormat;
//! ```

pub mod bgp;
pub mod mac;
pub mod utils;
