//! End-to-end scenarios with several sessions on one relay

pub mod two_peer_test;
