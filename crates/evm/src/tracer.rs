use crate::VmError;
use dogesync_primitives::{Address, U256};

/// Machine state handed to tracer callbacks.
#[derive(Clone, Debug, Default)]
pub struct ScopeContext {
    pub memory: Vec<u8>,
    pub stack: Vec<U256>,
    pub contract_address: Address,
    pub depth: usize,
}

/// Execution tracer. All hooks default to no-ops so implementations only
/// override what they observe.
#[allow(unused_variables)]
pub trait Tracer: Send {
    /// Top-level frame begins.
    fn capture_start(
        &mut self,
        from: Address,
        to: Address,
        create: bool,
        input: &[u8],
        gas: u64,
        value: U256,
    ) {
    }

    /// One instruction executed.
    fn capture_state(&mut self, scope: &ScopeContext, ip: usize, op: u8, gas: u64, gas_cost: u64) {
    }

    /// Nested frame begins.
    fn capture_enter(&mut self, typ: u8, from: Address, to: Address, input: &[u8], gas: u64, value: U256) {
    }

    /// Nested frame ends.
    fn capture_exit(&mut self, output: &[u8], gas_used: u64, err: Option<&VmError>) {}

    /// An instruction faulted.
    fn capture_fault(
        &mut self,
        scope: &ScopeContext,
        ip: usize,
        op: u8,
        gas: u64,
        gas_cost: u64,
        err: &VmError,
    ) {
    }

    /// Top-level frame ends.
    fn capture_end(&mut self, output: &[u8], gas_used: u64, err: Option<&VmError>) {}
}

/// The default tracer: observes nothing, costs nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}
