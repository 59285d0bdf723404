//! Instruction decoding interface.
//!
//! The scanner and the listing only need a small, decoder-neutral summary of
//! each instruction: its length, how it transfers control, a direct branch
//! target and the addressing form of its first operand. [`InstructionDecoder`]
//! produces that summary; [`iced::IcedDecoder`] is the x86/x64 backend.

pub mod iced;

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Execution continues with the next instruction
    Sequential,
    /// Direct unconditional jump
    Jump,
    /// Direct conditional jump, `loop*` or `j*cxz`
    ConditionalJump,
    /// Direct call
    Call,
    /// Jump through a register or memory operand
    IndirectJump,
    /// Call through a register or memory operand
    IndirectCall,
    Return,
    /// Halts or faults (`hlt`, `ud2`, undecodable bytes)
    Stop,
}

impl FlowKind {
    /// Direct control transfers whose target is encoded in the instruction.
    pub fn is_branch(&self) -> bool {
        matches!(self, FlowKind::Jump | FlowKind::ConditionalJump | FlowKind::Call)
    }

    /// Execution never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            FlowKind::Jump | FlowKind::IndirectJump | FlowKind::Return | FlowKind::Stop
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(self, FlowKind::Call | FlowKind::IndirectCall)
    }
}

/// Addressing form of an instruction's first operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Addressing {
    /// Memory operand made of a displacement only, e.g. `[0x403000]`
    Absolute(u64),
    /// RIP-relative memory operand, resolved against the decode address
    IpRelative(u64),
    /// Anything else (registers, immediates, based or indexed memory)
    Other,
}

/// Decoder-neutral summary of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub address: u64,
    /// Encoded length in bytes, at least 1
    pub length: usize,
    pub flow: FlowKind,
    /// Target of a direct branch or call
    pub target: Option<u64>,
    pub addressing: Addressing,
    /// Mnemonic and operands in assembler syntax
    pub text: String,
    /// The bytes did not decode to a valid instruction
    pub invalid: bool,
}

impl DecodedInstruction {
    /// Branch target for direct branches, `None` for everything else.
    pub fn branch_target(&self) -> Option<u64> {
        if self.flow.is_branch() {
            self.target
        } else {
            None
        }
    }
}

/// Decodes one instruction at a time.
pub trait InstructionDecoder {
    /// Decode the instruction at the start of `bytes`, located at `address`.
    ///
    /// `bytes` holds at least [`InstructionDecoder::max_instruction_length`]
    /// bytes (zero-padded by the caller where the image has none). Invalid
    /// encodings come back as a 1-byte instruction with `invalid` set and
    /// [`FlowKind::Stop`].
    fn decode(&self, address: u64, bytes: &[u8]) -> DecodedInstruction;

    /// Longest encoding the decoder can consume.
    fn max_instruction_length(&self) -> usize;

    fn name(&self) -> &str;
}
