//! Chart specifications for the five narrative acts.
//!
//! `spec` holds the serializable output types, `encoding` the policies every
//! chart shares, and the remaining modules one act each.

mod behaviour;
mod composer;
pub mod encoding;
mod flow_chart;
mod market;
pub mod spec;

pub use composer::ChartComposer;
#[cfg(test)]
pub use composer::{
    BOOKING_CHANGES, BOOKING_FLOW, CANCEL_GAP_HOTEL_YEAR, COUNTRY_BUBBLES, COUNTRY_TREEMAP,
    DEPOSIT_MIX, LEAD_TIME_DISTRIBUTION, VOLUME_HOTEL_YEAR,
};
pub use spec::ChartSpec;
