extern crate hdvec;

use hdvec::backend::SimulatedDevice;
use hdvec::error::Domain;
use hdvec::prelude::*;
use hdvec::{HdvError, HdvResult};
use std::sync::Arc;
use std::thread;

const D0: DeviceOrdinal = DeviceOrdinal::new(0);
const D1: DeviceOrdinal = DeviceOrdinal::new(1);

fn simulated(count: usize) -> (Arc<SimulatedDevice>, Context) {
    let sim = Arc::new(SimulatedDevice::new(count));
    let ctx = Context::new(sim.clone());
    (sim, ctx)
}

/// A buffer on `device` whose only current copy is on the device.
fn device_only(ctx: &Context, values: &[u32], device: DeviceOrdinal) -> DualBuffer<u32> {
    let mut buffer = DualBuffer::new(ctx, values.len(), 0u32, Some(device)).unwrap();
    buffer.device_view_mut().unwrap().copy_from(values).unwrap();
    assert_eq!(buffer.residency(), Residency::Device);
    buffer
}

#[test]
fn test_upload_invalidate_upload_costs_two_copies() {
    let (sim, ctx) = simulated(1);
    let mut buffer = DualBuffer::from_vec(&ctx, vec![1, 2, 3], Some(D0)).unwrap();
    assert_eq!(buffer.residency(), Residency::Host);

    assert_eq!(buffer.device_view().unwrap().len(), 3);
    assert_eq!(buffer.copy_stats().host_to_device, 1);
    assert_eq!(buffer.residency(), Residency::Synced);

    buffer.host_view_mut().unwrap()[0] = 10;
    assert_eq!(buffer.residency(), Residency::Host);

    let _ = buffer.device_view().unwrap();
    assert_eq!(buffer.copy_stats().host_to_device, 2);
    assert_eq!(buffer.copy_stats().total(), 2);
    assert_eq!(sim.transfers(D0).host_to_device, 2);
    assert_eq!(buffer.device_view().unwrap().to_vec().unwrap(), vec![10, 2, 3]);
}

#[test]
fn test_repeated_host_reads_copy_once() {
    let (sim, ctx) = simulated(1);
    let mut buffer = device_only(&ctx, &[4, 5, 6], D0);

    assert_eq!(buffer.host_view().unwrap(), &[4, 5, 6]);
    assert_eq!(buffer.host_view().unwrap(), &[4, 5, 6]);
    assert_eq!(buffer.copy_stats().device_to_host, 1);
    assert_eq!(sim.transfers(D0).device_to_host, 1);
    assert_eq!(buffer.residency(), Residency::Synced);
}

#[test]
fn test_device_writes_are_visible_on_host() {
    let (_sim, ctx) = simulated(1);
    let mut buffer = DualBuffer::from_slice(&ctx, &[1.0f32, 2.0, 3.0], Some(D0)).unwrap();
    let _ = buffer.host_view().unwrap();
    buffer
        .device_view_mut()
        .unwrap()
        .copy_from(&[7.0, 8.0, 9.0][..])
        .unwrap();
    assert!(buffer.try_host_view().is_none());
    assert_eq!(buffer.host_view().unwrap(), &[7.0, 8.0, 9.0]);
}

#[test]
fn test_a_valid_copy_always_exists() {
    let (_sim, ctx) = simulated(1);
    let mut buffer = DualBuffer::from_vec(&ctx, vec![1u8, 2, 3], Some(D0)).unwrap();
    let check = |b: &DualBuffer<u8>| {
        assert!(b.try_host_view().is_some() || b.try_device_view().is_some());
    };
    check(&buffer);
    let _ = buffer.device_view().unwrap();
    check(&buffer);
    let _ = buffer.device_view_mut().unwrap();
    check(&buffer);
    let _ = buffer.host_view().unwrap();
    check(&buffer);
    let _ = buffer.host_view_mut().unwrap();
    check(&buffer);
    buffer.fill(9).unwrap();
    check(&buffer);
    buffer.resize(5, 1).unwrap();
    check(&buffer);
}

#[test]
fn test_access_predicates_follow_residency() {
    let (_sim, ctx) = simulated(1);
    let mut buffer = DualBuffer::from_vec(&ctx, vec![0u16; 4], Some(D0)).unwrap();

    assert!(buffer.host_can_access(GpuAccess::Write));
    assert!(buffer.device_can_access(GpuAccess::None));
    assert!(!buffer.device_can_access(GpuAccess::Read));

    let _ = buffer.device_view().unwrap();
    assert!(buffer.host_can_access(GpuAccess::Read));
    assert!(!buffer.host_can_access(GpuAccess::Write));
    assert!(buffer.device_can_access(GpuAccess::Read));
    assert!(!buffer.device_can_access(GpuAccess::Write));

    let _ = buffer.device_view_mut().unwrap();
    assert!(!buffer.host_can_access(GpuAccess::Read));
    assert!(buffer.host_can_access(GpuAccess::None));
    assert!(buffer.device_can_access(GpuAccess::Write));
}

#[test]
fn test_fill_on_device_only_buffer_stays_on_device() {
    let (sim, ctx) = simulated(1);
    let mut buffer = device_only(&ctx, &[1, 2, 3, 4], D0);

    buffer.fill(0).unwrap();
    assert_eq!(buffer.residency(), Residency::Device);
    assert!(buffer.try_host_view().is_none());
    assert_eq!(buffer.copy_stats().device_to_host, 0);

    assert_eq!(buffer.host_view().unwrap(), &[0, 0, 0, 0]);
    assert_eq!(buffer.copy_stats().device_to_host, 1);
    assert_eq!(sim.transfers(D0).device_to_host, 1);
}

#[test]
fn test_fill_prefers_host_when_synced() {
    let (_sim, ctx) = simulated(1);
    let mut buffer = DualBuffer::from_vec(&ctx, vec![1, 2], Some(D0)).unwrap();
    let _ = buffer.device_view().unwrap();
    buffer.fill(5).unwrap();
    assert_eq!(buffer.residency(), Residency::Host);
    assert_eq!(buffer.try_host_view(), Some(&[5, 5][..]));
}

#[test]
fn test_resize_keeps_prefix_in_every_valid_copy() {
    let (_sim, ctx) = simulated(1);

    let mut host = DualBuffer::from_vec(&ctx, vec![1, 2, 3], Some(D0)).unwrap();
    host.resize(5, 9).unwrap();
    assert_eq!(host.size(), 5);
    assert_eq!(host.host_view().unwrap(), &[1, 2, 3, 9, 9]);

    let mut device = device_only(&ctx, &[1, 2, 3], D0);
    device.resize(5, 9).unwrap();
    assert_eq!(device.residency(), Residency::Device);
    assert_eq!(device.device_view().unwrap().len(), 5);
    assert_eq!(device.host_view().unwrap(), &[1, 2, 3, 9, 9]);

    let mut synced = DualBuffer::from_vec(&ctx, vec![1, 2, 3, 4], Some(D0)).unwrap();
    let _ = synced.device_view().unwrap();
    synced.resize(2, 0).unwrap();
    assert_eq!(synced.residency(), Residency::Synced);
    assert_eq!(synced.try_host_view(), Some(&[1, 2][..]));
    assert_eq!(synced.try_device_view().unwrap().to_vec().unwrap(), vec![1, 2]);
}

#[test]
fn test_copy_from_matches_source_wherever_it_lives() {
    let (sim, ctx) = simulated(2);

    let host_source = DualBuffer::from_vec(&ctx, vec![1u32, 2, 3], None).unwrap();
    let mut target = DualBuffer::from_vec(&ctx, vec![0u32; 7], Some(D0)).unwrap();
    target.copy_from(&host_source).unwrap();
    assert_eq!(target.size(), 3);
    assert_eq!(target.host_view().unwrap(), &[1, 2, 3]);

    // Same device: stays on the device.
    let device_source = device_only(&ctx, &[4, 5, 6, 7], D0);
    target.copy_from(&device_source).unwrap();
    assert_eq!(target.size(), 4);
    assert_eq!(target.residency(), Residency::Device);
    assert_eq!(sim.transfers(D0).device_to_device, 1);
    assert_eq!(target.host_view().unwrap(), &[4, 5, 6, 7]);

    // No device on the target: flows through the host.
    let mut host_target = DualBuffer::from_vec(&ctx, Vec::new(), None).unwrap();
    host_target.copy_from(&device_source).unwrap();
    assert_eq!(host_target.residency(), Residency::Host);
    assert_eq!(host_target.host_view().unwrap(), &[4, 5, 6, 7]);

    // Another device: also through the host.
    let mut other_device = DualBuffer::from_vec(&ctx, vec![0], Some(D1)).unwrap();
    other_device.copy_from(&device_source).unwrap();
    assert_eq!(other_device.residency(), Residency::Host);
    assert_eq!(other_device.host_view().unwrap(), &[4, 5, 6, 7]);
}

#[test]
fn test_copy_from_another_context_goes_through_host() {
    let (_sim_a, ctx_a) = simulated(1);
    let (sim_b, ctx_b) = simulated(1);
    let source = device_only(&ctx_a, &[3, 1, 4], D0);
    let mut target = DualBuffer::from_vec(&ctx_b, vec![], Some(D0)).unwrap();
    target.copy_from(&source).unwrap();
    assert_eq!(target.residency(), Residency::Host);
    assert_eq!(sim_b.transfers(D0).device_to_device, 0);
    assert_eq!(target.host_view().unwrap(), &[3, 1, 4]);
}

#[test]
fn test_set_device_pulls_device_only_data_home() {
    let (sim, ctx) = simulated(2);
    let mut buffer = device_only(&ctx, &[8, 6, 7], D0);
    assert_eq!(sim.live_allocations(D0), 1);

    buffer.set_device(Some(D1)).unwrap();
    assert_eq!(buffer.device_index(), Some(D1));
    assert_eq!(buffer.residency(), Residency::Host);
    assert_eq!(sim.transfers(D0).device_to_host, 1);
    assert_eq!(sim.live_allocations(D0), 0);
    assert_eq!(sim.live_allocations(D1), 0);
    assert_eq!(buffer.host_view().unwrap(), &[8, 6, 7]);

    assert_eq!(buffer.device_view().unwrap().to_vec().unwrap(), vec![8, 6, 7]);
    assert_eq!(sim.transfers(D1).host_to_device, 1);
    assert_eq!(sim.selections(), vec![D0, D1]);
}

#[test]
fn test_set_device_to_none_keeps_contents() {
    let (_sim, ctx) = simulated(1);
    let mut buffer = device_only(&ctx, &[1, 1, 2], D0);
    buffer.set_device(None).unwrap();
    assert_eq!(buffer.device_index(), None);
    assert!(!buffer.device_can_access(GpuAccess::Read));
    assert_eq!(buffer.into_vec().unwrap(), vec![1, 1, 2]);
}

#[test]
fn test_set_device_rejects_unknown_devices() {
    let (_sim, ctx) = simulated(1);
    let mut buffer = device_only(&ctx, &[1, 2], D0);
    let err = buffer.set_device(Some(DeviceOrdinal::new(5))).unwrap_err();
    assert!(matches!(err, HdvError::InvalidDevice { available: 1, .. }));
    assert_eq!(buffer.device_index(), Some(D0));
    assert_eq!(buffer.residency(), Residency::Device);

    let host_ctx = Context::host_only();
    let result = DualBuffer::from_vec(&host_ctx, vec![1u8], Some(D0));
    assert!(matches!(result, Err(HdvError::InvalidDevice { available: 0, .. })));
}

#[test]
#[should_panic(expected = "no device designated")]
fn test_device_view_without_device_panics() {
    let mut buffer = DualBuffer::from_vec(&Context::host_only(), vec![1u64], None).unwrap();
    let _ = buffer.device_view();
}

#[test]
fn test_allocation_failure_is_reported_and_recoverable() {
    let sim = Arc::new(SimulatedDevice::with_capacity(1, 16));
    let ctx = Context::new(sim.clone());
    let mut buffer = DualBuffer::from_vec(&ctx, vec![1u64; 8], Some(D0)).unwrap();

    match buffer.device_view() {
        Err(HdvError::OutOfMemory {
            domain: Domain::Device,
            device: Some(D0),
            requested: 64,
        }) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(buffer.residency(), Residency::Host);
    assert_eq!(buffer.copy_stats().total(), 0);

    buffer.resize(2, 0).unwrap();
    assert_eq!(buffer.device_view().unwrap().len(), 2);
}

#[test]
fn test_eager_allocation_happens_at_designation() {
    let sim = Arc::new(SimulatedDevice::with_capacity(1, 64));
    let ctx = Context::new(sim.clone()).with_flags(ContextFlags::EAGER_DEVICE_ALLOC);

    let buffer = DualBuffer::from_vec(&ctx, vec![0u32; 4], Some(D0)).unwrap();
    assert_eq!(sim.live_allocations(D0), 1);
    assert_eq!(sim.allocated_bytes(D0), 16);
    assert_eq!(buffer.residency(), Residency::Host);

    let too_big: HdvResult<DualBuffer<u64>> = DualBuffer::from_vec(&ctx, vec![0; 64], Some(D0));
    assert!(matches!(too_big, Err(HdvError::OutOfMemory { .. })));

    let mut host_side = DualBuffer::from_vec(&ctx, vec![7u64; 64], None).unwrap();
    assert!(host_side.set_device(Some(D0)).is_err());
    assert_eq!(host_side.device_index(), None);
    assert_eq!(host_side.host_view().unwrap()[63], 7);
}

#[test]
fn test_release_on_host_write_frees_stale_storage() {
    let (sim, ctx) = simulated(1);
    let ctx = ctx.with_flags(ContextFlags::RELEASE_ON_HOST_WRITE);
    let mut buffer = DualBuffer::from_vec(&ctx, vec![1i32, 2], Some(D0)).unwrap();

    let _ = buffer.device_view().unwrap();
    assert_eq!(sim.live_allocations(D0), 1);
    let _ = buffer.host_view_mut().unwrap();
    assert_eq!(sim.live_allocations(D0), 0);

    let _ = buffer.device_view().unwrap();
    assert_eq!(sim.live_allocations(D0), 1);
}

#[test]
fn test_clone_is_deep() {
    let (sim, ctx) = simulated(1);
    let source = device_only(&ctx, &[2, 7, 1], D0);

    let mut copy = source.clone();
    assert_eq!(copy.device_index(), Some(D0));
    assert_eq!(copy.residency(), Residency::Device);
    assert_eq!(sim.transfers(D0).device_to_device, 1);

    copy.device_view_mut().unwrap().copy_from(&[0, 0, 0][..]).unwrap();
    assert_eq!(source.try_device_view().unwrap().to_vec().unwrap(), vec![2, 7, 1]);
    assert_eq!(copy.host_view().unwrap(), &[0, 0, 0]);
}

#[test]
fn test_extend_invalidates_device_copy() {
    let (_sim, ctx) = simulated(1);
    let mut buffer = DualBuffer::from_vec(&ctx, vec![1u32], Some(D0)).unwrap();
    let _ = buffer.device_view().unwrap();
    buffer.extend_from_slice(&[2, 3]).unwrap();
    assert_eq!(buffer.size(), 3);
    assert_eq!(buffer.residency(), Residency::Host);
    assert_eq!(buffer.device_view().unwrap().to_vec().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_host_only_context_is_a_plain_vector() {
    let mut buffer = DualBuffer::with_len(&Context::host_only(), 3, None).unwrap();
    buffer.host_view_mut().unwrap().copy_from_slice(&[1.5f64, 2.5, 3.5]);
    buffer.resize(4, 0.0).unwrap();
    buffer.fill(1.0).unwrap();
    assert_eq!(buffer.copy_stats().total(), 0);
    assert_eq!(buffer.into_vec().unwrap(), vec![1.0; 4]);
}

#[test]
fn test_shared_reads_from_many_threads() {
    let (_sim, ctx) = simulated(1);
    let mut buffer = DualBuffer::from_vec(&ctx, (0..1000u32).collect(), Some(D0)).unwrap();
    let _ = buffer.device_view().unwrap();
    let buffer = buffer;

    thread::scope(|scope| {
        for _ in 0..4 {
            let _ = scope.spawn(|| {
                for _ in 0..100 {
                    assert_eq!(buffer.size(), 1000);
                    assert_eq!(buffer.device_index(), Some(D0));
                    assert!(buffer.host_can_access(GpuAccess::Read));
                    assert!(buffer.device_can_access(GpuAccess::Read));
                    assert_eq!(buffer.try_host_view().unwrap()[999], 999);
                    assert_eq!(buffer.try_device_view().unwrap().len(), 1000);
                }
            });
        }
    });
    assert_eq!(buffer.copy_stats().total(), 1);
}

#[test]
fn test_buffers_on_different_devices_sync_in_parallel() {
    let (sim, ctx) = simulated(2);
    let handles: Vec<_> = [D0, D1]
        .iter()
        .map(|&device| {
            let mut buffer = DualBuffer::new(&ctx, 256, device.get(), Some(device)).unwrap();
            thread::spawn(move || {
                for _ in 0..10 {
                    let _ = buffer.device_view().unwrap();
                    buffer.host_view_mut().unwrap()[0] += 1;
                }
                buffer.into_vec().unwrap()
            })
        })
        .collect();
    let results: Vec<Vec<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0][0], 10);
    assert_eq!(results[1][0], 11);
    assert_eq!(results[1][255], 1);
    assert_eq!(sim.transfers(D0).host_to_device, 10);
    assert_eq!(sim.transfers(D1).host_to_device, 10);
    assert_eq!(sim.live_allocations(D0), 0);
}
