use super::EventConfig;
use crate::ffi::bindings as b;

#[derive(Clone, Debug)]
pub enum Hardware {
    CpuCycle,
    BusCycle,
    RefCpuCycle,

    Cache(Type, Op, OpResult),
    CacheMiss,
    CacheAccess,

    BranchMiss,
    BranchInstr,

    BackendStalledCycle,
    FrontendStalledCycle,

    Instr,
}

#[derive(Clone, Debug)]
pub enum Type {
    L1d,
    L1i,
    Ll,
    Dtlb,
    Itlb,
    Bpu,
    Node,
}

#[derive(Clone, Debug)]
pub enum Op {
    Read,
    Write,
    Prefetch,
}

#[derive(Clone, Debug)]
pub enum OpResult {
    Miss,
    Access,
}

super::try_from!(Hardware, value, {
    let config = match value {
        Hardware::CpuCycle => b::PERF_COUNT_HW_CPU_CYCLES,
        Hardware::BusCycle => b::PERF_COUNT_HW_BUS_CYCLES,
        Hardware::RefCpuCycle => b::PERF_COUNT_HW_REF_CPU_CYCLES,
        Hardware::BranchMiss => b::PERF_COUNT_HW_BRANCH_MISSES,
        Hardware::BranchInstr => b::PERF_COUNT_HW_BRANCH_INSTRUCTIONS,
        Hardware::BackendStalledCycle => b::PERF_COUNT_HW_STALLED_CYCLES_BACKEND,
        Hardware::FrontendStalledCycle => b::PERF_COUNT_HW_STALLED_CYCLES_FRONTEND,
        Hardware::Instr => b::PERF_COUNT_HW_INSTRUCTIONS,
        Hardware::CacheMiss => b::PERF_COUNT_HW_CACHE_MISSES,
        Hardware::CacheAccess => b::PERF_COUNT_HW_CACHE_REFERENCES,
        Hardware::Cache(ty, op, result) => {
            let ty = match ty {
                Type::L1d => b::PERF_COUNT_HW_CACHE_L1D,
                Type::L1i => b::PERF_COUNT_HW_CACHE_L1I,
                Type::Ll => b::PERF_COUNT_HW_CACHE_LL,
                Type::Dtlb => b::PERF_COUNT_HW_CACHE_DTLB,
                Type::Itlb => b::PERF_COUNT_HW_CACHE_ITLB,
                Type::Bpu => b::PERF_COUNT_HW_CACHE_BPU,
                Type::Node => b::PERF_COUNT_HW_CACHE_NODE,
            };
            let op = match op {
                Op::Read => b::PERF_COUNT_HW_CACHE_OP_READ,
                Op::Write => b::PERF_COUNT_HW_CACHE_OP_WRITE,
                Op::Prefetch => b::PERF_COUNT_HW_CACHE_OP_PREFETCH,
            };
            let result = match result {
                OpResult::Access => b::PERF_COUNT_HW_CACHE_RESULT_ACCESS,
                OpResult::Miss => b::PERF_COUNT_HW_CACHE_RESULT_MISS,
            };
            return Ok(Self(EventConfig {
                ty: b::PERF_TYPE_HW_CACHE,
                config: ty | (op << 8) | (result << 16),
                config1: 0,
                config2: 0,
                config3: 0,
                bp_type: 0,
            }));
        }
    };

    Ok(Self(EventConfig {
        ty: b::PERF_TYPE_HARDWARE,
        config,
        config1: 0,
        config2: 0,
        config3: 0,
        bp_type: 0,
    }))
});
