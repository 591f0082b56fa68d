pub mod dhcppkt;
pub mod pktparser;
