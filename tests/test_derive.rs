#![allow(dead_code)]

#[macro_use]
extern crate hdvec;

use hdvec::{Context, DualBuffer};

#[derive(Clone, DeviceCopy)]
struct ZeroSizedStruct;

#[derive(Clone, DeviceCopy)]
struct TupleStruct(u64, u64);

#[derive(Clone, DeviceCopy)]
struct NormalStruct {
    x: u64,
    y: u64,
}

#[derive(Clone, DeviceCopy)]
struct ContainerStruct {
    a: NormalStruct,
    b: TupleStruct,
}

#[derive(Clone, DeviceCopy)]
struct GenericStruct<T> {
    value: T,
}

#[derive(Clone, DeviceCopy)]
enum TestEnum {
    Unit,
    Tuple(u64),
    Struct { x: u64, y: u64 },
    Container { a: NormalStruct, b: TupleStruct },
}

#[derive(Clone, DeviceCopy)]
enum GenericEnum<T> {
    Unit,
    Generic { val: T },
}

#[derive(Copy, Clone, DeviceCopy)]
#[repr(C)]
union TestUnion {
    u: u64,
    i: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, DeviceCopy)]
#[repr(C)]
struct GradientPair {
    grad: f32,
    hess: f32,
}

#[test]
fn test_hidden_functions() {
    __verify_ZeroSizedStruct_can_implement_DeviceCopy(&ZeroSizedStruct);
    __verify_TupleStruct_can_implement_DeviceCopy(&TupleStruct(0, 0));
    __verify_NormalStruct_can_implement_DeviceCopy(&NormalStruct { x: 0, y: 0 });
    __verify_ContainerStruct_can_implement_DeviceCopy(&ContainerStruct {
        a: NormalStruct { x: 0, y: 0 },
        b: TupleStruct(0, 0),
    });
    __verify_GenericStruct_can_implement_DeviceCopy(&GenericStruct { value: 0u64 });
    __verify_TestEnum_can_implement_DeviceCopy(&TestEnum::Unit);
    __verify_GenericEnum_can_implement_DeviceCopy::<u64>(&GenericEnum::Unit);
    __verify_TestUnion_can_implement_DeviceCopy(&TestUnion { u: 0u64 });
}

#[test]
fn test_derived_types_can_live_in_dual_buffers() {
    let ctx = Context::simulated(1);
    let pairs = vec![
        GradientPair { grad: 0.5, hess: 1.0 },
        GradientPair { grad: -0.25, hess: 2.0 },
    ];
    let mut buffer = DualBuffer::from_vec(&ctx, pairs.clone(), Some(hdvec::DeviceOrdinal::new(0)))
        .unwrap();
    let _ = buffer.device_view_mut().unwrap();
    assert_eq!(buffer.into_vec().unwrap(), pairs);
}
