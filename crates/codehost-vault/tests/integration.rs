//! Integration tests for the codehost-vault crate.
//!
//! These tests exercise the public surface the rest of the workspace relies
//! on: configuration-style key strings feeding a sealer.

use codehost_vault::{Sealer, VaultError, keys};

#[test]
fn configured_master_key_seals_and_reopens() {
    let encoded = keys::generate_key().unwrap();

    // Two sealers built from the same configured key interoperate, which is
    // what happens across process restarts.
    let first = Sealer::new(&keys::decode_key(&encoded).unwrap()).unwrap();
    let second = Sealer::new(&keys::decode_key(&encoded).unwrap()).unwrap();

    let sealed = first.seal("gho_abc123").unwrap();
    assert_eq!(second.open(&sealed).unwrap(), "gho_abc123");
}

#[test]
fn rotated_master_key_cannot_open_old_values() {
    let old = Sealer::new(&keys::decode_key(&keys::generate_key().unwrap()).unwrap()).unwrap();
    let new = Sealer::new(&keys::decode_key(&keys::generate_key().unwrap()).unwrap()).unwrap();

    let sealed = old.seal("glpat-xyz").unwrap();
    assert!(matches!(
        new.open(&sealed),
        Err(VaultError::DecryptionFailed { .. })
    ));
}

#[test]
fn oversized_key_rejected_by_sealer() {
    // Signing keys may be longer than 32 bytes; the sealer needs exactly 32.
    let long = vec![7u8; 64];
    assert!(Sealer::new(&long).is_err());
}
