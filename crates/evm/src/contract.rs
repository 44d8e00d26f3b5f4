use dogesync_primitives::{Address, U256};

/// How a frame was entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallType {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
}

/// Input of one execution frame.
#[derive(Clone, Debug)]
pub struct Contract {
    pub call_type: CallType,
    pub depth: usize,
    /// The account whose storage and balance the frame operates on.
    pub address: Address,
    /// The account the code was loaded from. Differs from `address` for
    /// delegate and code calls.
    pub code_address: Address,
    pub caller: Address,
    pub value: U256,
    pub gas: u64,
    pub code: Vec<u8>,
    pub input: Vec<u8>,
    pub is_static: bool,
}

impl Contract {
    #[allow(clippy::too_many_arguments)]
    pub fn new_call(
        call_type: CallType,
        depth: usize,
        caller: Address,
        to: Address,
        value: U256,
        gas: u64,
        code: Vec<u8>,
        input: Vec<u8>,
    ) -> Self {
        Self {
            call_type,
            depth,
            address: to,
            code_address: to,
            caller,
            value,
            gas,
            code,
            input,
            is_static: call_type == CallType::StaticCall,
        }
    }

    pub fn new_creation(
        call_type: CallType,
        depth: usize,
        caller: Address,
        address: Address,
        value: U256,
        gas: u64,
        code: Vec<u8>,
    ) -> Self {
        Self {
            call_type,
            depth,
            address,
            code_address: address,
            caller,
            value,
            gas,
            // for creations, the init code is the code being run
            code,
            input: Vec::new(),
            is_static: false,
        }
    }

    pub fn is_creation(&self) -> bool {
        matches!(self.call_type, CallType::Create | CallType::Create2)
    }
}
