//! Property tests for the file log framing.

use offsync_storage::{FileBackend, StorageBackend};
use proptest::prelude::*;
use tempfile::tempdir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn reopened_log_returns_every_record(records in prop::collection::vec(
        prop::collection::vec(any::<u8>(), 0..64),
        0..16,
    )) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            for record in &records {
                backend.append(record).unwrap();
            }
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        prop_assert_eq!(backend.len().unwrap(), records.len() as u64);
        prop_assert_eq!(backend.read_all().unwrap(), records);
    }
}
