//! Part serializers.
//!
//! Each part has a full writer used for new packages and an update path
//! that splices changes into the source bytes so unknown markup survives.

pub mod doc_props;
pub mod drawing;
pub mod shared_strings;
pub mod styles;
pub mod theme;
pub mod workbook;
pub mod worksheet;

pub use doc_props::{update_app_properties, write_app_properties, write_core_properties};
pub use drawing::{append_anchor, drawing_part, next_shape_id, picture_anchor};
pub use shared_strings::{append_shared_strings, write_shared_strings};
pub use styles::{append_styles, write_styles};
pub use theme::{ColorScheme, Theme};
pub use workbook::{update_workbook, write_workbook};
pub use worksheet::{SheetFrame, sheet_data, sheet_frame, stream_worksheet, write_worksheet};
