/// Bytecode instructions for the Lox VM.
///
/// Each instruction is one opcode byte followed by its operands:
/// - `Constant`, `GetGlobal`, `DefineGlobal`, `SetGlobal`: constant index (u8)
/// - `GetLocal`, `SetLocal`: stack slot relative to the frame base (u8)
/// - `Call`: argument count (u8)
/// - `Jump`, `JumpIfFalse`: forward offset (u16, big-endian)
/// - `Loop`: backward offset (u16, big-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // ========================================
    // Constants
    // ========================================
    Constant,
    Nil,
    True,
    False,

    // ========================================
    // Stack / Variables
    // ========================================
    Pop,
    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,

    // ========================================
    // Comparison
    // ========================================
    Equal,
    Greater,
    Less,

    // ========================================
    // Arithmetic / Logic
    // ========================================
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,

    // ========================================
    // Statements / Control Flow
    // ========================================
    Print,
    Jump,
    JumpIfFalse, // condition stays on the stack
    Loop,
    Call,
    Return,
}

impl OpCode {
    /// Every opcode, indexed by its byte value.
    pub const ALL: [OpCode; 25] = [
        OpCode::Constant,
        OpCode::Nil,
        OpCode::True,
        OpCode::False,
        OpCode::Pop,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::GetGlobal,
        OpCode::DefineGlobal,
        OpCode::SetGlobal,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Print,
        OpCode::Jump,
        OpCode::JumpIfFalse,
        OpCode::Loop,
        OpCode::Call,
        OpCode::Return,
    ];

    /// Mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Print => "OP_PRINT",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Return => "OP_RETURN",
        }
    }

    /// Number of operand bytes following the opcode.
    pub fn operand_len(self) -> usize {
        match self {
            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::Call => 1,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => 2,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminants_match_table() {
        for (i, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i, "{}", op.name());
            assert_eq!(OpCode::try_from(i as u8), Ok(*op));
        }
    }

    #[test]
    fn test_unknown_byte() {
        assert_eq!(OpCode::try_from(OpCode::ALL.len() as u8), Err(25));
        assert_eq!(OpCode::try_from(255), Err(255));
    }

    #[test]
    fn test_operand_len() {
        assert_eq!(OpCode::Return.operand_len(), 0);
        assert_eq!(OpCode::Constant.operand_len(), 1);
        assert_eq!(OpCode::Loop.operand_len(), 2);
    }
}
