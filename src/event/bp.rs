use super::EventConfig;
use crate::ffi::bindings as b;

#[derive(Clone, Debug)]
pub struct Breakpoint {
    pub ty: Type,
    pub addr: u64,
}

#[derive(Clone, Debug)]
pub enum Type {
    R(Len),
    W(Len),
    Rw(Len),
    X,
}

#[derive(Clone, Debug)]
pub enum Len {
    _1,
    _2,
    _3,
    _4,
    _5,
    _6,
    _7,
    _8,
}

impl Len {
    fn bytes(&self) -> u64 {
        match self {
            Len::_1 => 1,
            Len::_2 => 2,
            Len::_3 => 3,
            Len::_4 => 4,
            Len::_5 => 5,
            Len::_6 => 6,
            Len::_7 => 7,
            Len::_8 => 8,
        }
    }
}

super::try_from!(Breakpoint, value, {
    let (bp_type, len) = match &value.ty {
        Type::R(len) => (b::HW_BREAKPOINT_R, len.bytes()),
        Type::W(len) => (b::HW_BREAKPOINT_W, len.bytes()),
        Type::Rw(len) => (b::HW_BREAKPOINT_RW, len.bytes()),
        Type::X => (b::HW_BREAKPOINT_X, Len::_8.bytes()),
    };

    Ok(Self(EventConfig {
        ty: b::PERF_TYPE_BREAKPOINT,
        config: 0,
        config1: value.addr,
        config2: len,
        config3: 0,
        bp_type,
    }))
});
