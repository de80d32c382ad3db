//! Data layer: read-only bar store and the aligned price panel.

pub mod panel;
pub mod store;

pub use panel::{
    backward_fill, build_panel, forward_fill, PanelError, PricePanel, TickerColumns,
    MIN_PANEL_BARS,
};
pub use store::{default_min_date, BarStore, MemoryBarStore, ParquetBarStore, StoreError};
