use crate::disasm::{Addressing, DecodedInstruction, FlowKind, InstructionDecoder};
use crate::image::Bitness;

const MAX_INSTRUCTION_LENGTH: usize = 15;

/// x86 / x86-64 decoder backed by iced-x86, producing Intel syntax text.
pub struct IcedDecoder {
    bitness: Bitness,
}

impl IcedDecoder {
    pub fn new(bitness: Bitness) -> Self {
        Self { bitness }
    }

    fn flow_kind(instr: &iced_x86::Instruction) -> FlowKind {
        use iced_x86::{FlowControl, Mnemonic};
        if instr.mnemonic() == Mnemonic::Hlt {
            return FlowKind::Stop;
        }
        match instr.flow_control() {
            FlowControl::UnconditionalBranch => FlowKind::Jump,
            FlowControl::ConditionalBranch => FlowKind::ConditionalJump,
            FlowControl::Call => FlowKind::Call,
            FlowControl::IndirectBranch => FlowKind::IndirectJump,
            FlowControl::IndirectCall => FlowKind::IndirectCall,
            FlowControl::Return => FlowKind::Return,
            FlowControl::Exception => FlowKind::Stop,
            // Next, Interrupt, XbeginXabortXend
            _ => FlowKind::Sequential,
        }
    }

    fn branch_target(instr: &iced_x86::Instruction) -> Option<u64> {
        use iced_x86::OpKind;
        if instr.op_count() == 0 {
            return None;
        }
        match instr.op0_kind() {
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                Some(instr.near_branch_target())
            }
            _ => None,
        }
    }

    fn addressing(&self, instr: &iced_x86::Instruction) -> Addressing {
        use iced_x86::{OpKind, Register as IReg};
        if instr.op_count() == 0 || instr.op0_kind() != OpKind::Memory {
            return Addressing::Other;
        }
        if instr.is_ip_rel_memory_operand() {
            return Addressing::IpRelative(instr.ip_rel_memory_address());
        }
        if instr.memory_base() != IReg::None || instr.memory_index() != IReg::None {
            return Addressing::Other;
        }
        let displacement = match self.bitness {
            Bitness::Bits32 => u64::from(instr.memory_displacement32()),
            Bitness::Bits64 => instr.memory_displacement64(),
        };
        Addressing::Absolute(displacement)
    }
}

impl InstructionDecoder for IcedDecoder {
    fn decode(&self, address: u64, bytes: &[u8]) -> DecodedInstruction {
        use iced_x86::{Decoder, DecoderOptions, Formatter, IntelFormatter};

        let mut decoder = Decoder::new(self.bitness.bits(), bytes, DecoderOptions::NONE);
        decoder.set_ip(address);

        let instr = decoder.decode();
        if instr.is_invalid() {
            return DecodedInstruction {
                address,
                length: 1,
                flow: FlowKind::Stop,
                target: None,
                addressing: Addressing::Other,
                text: "(bad)".to_string(),
                invalid: true,
            };
        }

        let mut fmt = IntelFormatter::new();
        fmt.options_mut().set_uppercase_hex(false);
        fmt.options_mut().set_space_after_operand_separator(true);
        let mut text = String::new();
        fmt.format(&instr, &mut text);

        DecodedInstruction {
            address,
            length: instr.len().max(1),
            flow: Self::flow_kind(&instr),
            target: Self::branch_target(&instr),
            addressing: self.addressing(&instr),
            text,
            invalid: false,
        }
    }

    fn max_instruction_length(&self) -> usize {
        MAX_INSTRUCTION_LENGTH
    }

    fn name(&self) -> &str {
        "iced-x86"
    }
}
