//! Integration tests for the hybrid handle's detachable-quantizer
//! protocol: parking, sharing, and reattachment across handles.

use std::sync::Arc;

use vecbridge::{
    keys, Config, DetachableQuantizer, HybridHandle, IndexHandle, IndexType, TwoPhaseBuild,
};

fn make_vectors(n: usize, dim: usize) -> (Vec<f32>, Vec<i64>) {
    let vectors: Vec<f32> = (0..n)
        .flat_map(|i| (0..dim).map(move |j| (i as f32 * 0.1 + j as f32 * 0.01).sin()))
        .collect();
    let ids: Vec<i64> = (0..n as i64).collect();
    (vectors, ids)
}

fn built_handle(n: usize, dim: usize, nlist: usize) -> HybridHandle {
    let (vectors, ids) = make_vectors(n, dim);
    let config = Config::new().with(keys::DIM, dim).with(keys::NLIST, nlist);
    let mut handle = HybridHandle::new();
    handle.build_all(&vectors, &ids, None, &config).unwrap();
    handle
}

#[test]
fn test_park_and_reattach_cycle() {
    let mut handle = built_handle(300, 8, 8);
    let (vectors, _) = make_vectors(300, 8);
    let search = Config::new().with(keys::K, 5).with(keys::NPROBE, 8);

    let before = handle.search(&vectors[..8], &search).unwrap();
    let set = handle.serialize().unwrap();

    // Park: residual data stays resident, quantizer memory is released
    handle.unset_quantizer().unwrap();
    assert_eq!(handle.count(), 300);
    assert!(handle.search(&vectors[..8], &search).unwrap_err().is_not_ready());

    // Reattach from the serialized form and results come back verbatim
    let quantizer = handle.load_quantizer(&set, &Config::new()).unwrap();
    handle.set_quantizer(quantizer).unwrap();

    let after = handle.search(&vectors[..8], &search).unwrap();
    assert_eq!(before.ids(), after.ids());
    assert_eq!(before.distances(), after.distances());
}

#[test]
fn test_one_quantizer_serves_many_handles() {
    let source = built_handle(200, 8, 4);
    let (vectors, _) = make_vectors(200, 8);
    let search = Config::new().with(keys::K, 3).with(keys::NPROBE, 4);

    let set = source.serialize().unwrap();
    let quantizer = source.load_quantizer(&set, &Config::new()).unwrap();

    // Two fresh handles restore residual data only, then share the one
    // quantizer instance
    let mut fleet = Vec::new();
    for _ in 0..2 {
        let mut handle = HybridHandle::new();
        handle
            .load_data(&quantizer, &set, &Config::new())
            .unwrap();
        assert_eq!(handle.count(), 200);
        assert!(!handle.quantizer_attached());

        handle.set_quantizer(Arc::clone(&quantizer)).unwrap();
        fleet.push(handle);
    }
    assert_eq!(Arc::strong_count(&quantizer), 3);

    let truth = source.search(&vectors[..8], &search).unwrap();
    for handle in &fleet {
        let hits = handle.search(&vectors[..8], &search).unwrap();
        assert_eq!(hits.ids(), truth.ids());
    }

    // Detaching one handle leaves the shared instance alive for the rest
    fleet[0].unset_quantizer().unwrap();
    assert_eq!(Arc::strong_count(&quantizer), 2);
    assert!(fleet[1].search(&vectors[..8], &search).is_ok());
}

#[test]
fn test_set_quantizer_wrong_shape() {
    let mut handle = built_handle(100, 4, 4);
    let other = built_handle(100, 8, 4);

    let set = other.serialize().unwrap();
    let wrong = handle.load_quantizer(&set, &Config::new()).unwrap();

    let err = handle.set_quantizer(wrong).unwrap_err();
    assert!(err.is_dimension_mismatch());
    // Original attachment is untouched
    assert!(handle.quantizer_attached());
}

#[test]
fn test_set_quantizer_wrong_partition_count() {
    let mut handle = built_handle(100, 4, 4);
    let other = built_handle(100, 4, 8);

    let set = other.serialize().unwrap();
    let wrong = handle.load_quantizer(&set, &Config::new()).unwrap();
    assert!(handle.set_quantizer(wrong).unwrap_err().is_dimension_mismatch());
}

#[test]
fn test_load_data_requires_matching_quantizer() {
    let source = built_handle(100, 4, 4);
    let set = source.serialize().unwrap();

    let other = built_handle(100, 4, 8);
    let foreign = other
        .load_quantizer(&other.serialize().unwrap(), &Config::new())
        .unwrap();

    let mut fresh = HybridHandle::new();
    let err = fresh.load_data(&foreign, &set, &Config::new()).unwrap_err();
    assert!(err.is_dimension_mismatch());
    assert_eq!(fresh.dimension(), 0);
}

#[test]
fn test_load_data_rejects_coarser_set_while_attached() {
    let mut handle = built_handle(100, 4, 8);
    let (vectors, _) = make_vectors(100, 4);
    let search = Config::new().with(keys::K, 1).with(keys::NPROBE, 8);

    // A compatible-dimension set with fewer partitions must not slip
    // under the attached 8-partition quantizer
    let coarse = built_handle(100, 4, 2);
    let set = coarse.serialize().unwrap();
    let reference = coarse.load_quantizer(&set, &Config::new()).unwrap();

    let err = handle.load_data(&reference, &set, &Config::new()).unwrap_err();
    assert!(err.is_dimension_mismatch());

    // Residual data is untouched and search still succeeds
    assert_eq!(handle.count(), 100);
    assert!(handle.quantizer_attached());
    let hits = handle.search(&vectors[..4], &search).unwrap();
    assert_eq!(hits.ids(), &[0]);
}

#[test]
fn test_post_build_add_unsupported() {
    let mut handle = built_handle(100, 4, 4);
    let (vectors, ids) = make_vectors(5, 4);
    let err = handle.add(&vectors, &ids, &Config::new()).unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(handle.count(), 100);
}

#[test]
fn test_full_load_restores_attached_state() {
    let source = built_handle(150, 8, 4);
    let (vectors, _) = make_vectors(150, 8);
    let search = Config::new().with(keys::K, 3).with(keys::NPROBE, 4);

    let set = source.serialize().unwrap();
    let mut restored = HybridHandle::new();
    restored.load(&set).unwrap();

    assert_eq!(restored.index_type(), IndexType::InvertedFileHybrid);
    assert!(restored.quantizer_attached());
    assert!(restored.is_trained());

    let a = source.search(&vectors[..8], &search).unwrap();
    let b = restored.search(&vectors[..8], &search).unwrap();
    assert_eq!(a.ids(), b.ids());
}

#[test]
fn test_serialize_while_parked_not_ready() {
    let mut handle = built_handle(100, 4, 2);
    handle.unset_quantizer().unwrap();
    assert!(handle.serialize().unwrap_err().is_not_ready());
}
