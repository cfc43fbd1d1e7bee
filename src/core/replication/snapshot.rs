// src/core/replication/snapshot.rs

//! The fixed, empty on-disk snapshot payload sent for every full resync.
//!
//! Persisting or reconstructing a real dataset snapshot is out of scope.
//! Every `PSYNC` therefore hands the replica this exact byte sequence
//! regardless of what keys actually exist; live state still arrives
//! correctly because every subsequent write is propagated over the command
//! stream from offset 0 onward.
pub const EMPTY_SNAPSHOT: [u8; 88] = [
    0x52, 0x45, 0x44, 0x49, 0x53, 0x30, 0x30, 0x31, 0x31, 0xFA, 0x09, 0x72, 0x65, 0x64, 0x69, 0x73,
    0x2D, 0x76, 0x65, 0x72, 0x05, 0x37, 0x2E, 0x32, 0x2E, 0x30, 0xFA, 0x0A, 0x72, 0x65, 0x64, 0x69,
    0x73, 0x2D, 0x62, 0x69, 0x74, 0x73, 0xC0, 0x40, 0xFA, 0x05, 0x63, 0x74, 0x69, 0x6D, 0x65, 0xC2,
    0x6D, 0x08, 0xBC, 0x65, 0xFA, 0x08, 0x75, 0x73, 0x65, 0x64, 0x2D, 0x6D, 0x65, 0x6D, 0xC2, 0xB0,
    0xC4, 0x10, 0x00, 0xFA, 0x08, 0x61, 0x6F, 0x66, 0x2D, 0x62, 0x61, 0x73, 0x65, 0xC0, 0x00, 0xFF,
    0xF0, 0x6E, 0x3B, 0xFE, 0xC0, 0xFF, 0x5A, 0xA2,
];
