//! The x86-64 general purpose register file.
//!
//! A [`Gpr`] names the architectural register; the operand width chooses
//! which alias is printed (`al`, `ax`, `eax`, `rax`). The System V AMD64
//! queries live here too: integer arguments one through six pass in
//! `rdi, rsi, rdx, rcx, r8, r9` and the integer result comes back in
//! `rax`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gpr {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Word,
    Dword,
    Qword,
}

impl Width {
    /// The operand width that moves a value of `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics when `size` is not 1, 2, 4 or 8.
    pub fn from_size(size: u32) -> Self {
        match size {
            1 => Width::Byte,
            2 => Width::Word,
            4 => Width::Dword,
            8 => Width::Qword,
            other => panic!("invalid operand size {other}"),
        }
    }
}

/// Names indexed `[byte, word, dword, qword]` per register.
const NAMES: [[&str; 4]; 16] = [
    ["al", "ax", "eax", "rax"],
    ["bl", "bx", "ebx", "rbx"],
    ["cl", "cx", "ecx", "rcx"],
    ["dl", "dx", "edx", "rdx"],
    ["sil", "si", "esi", "rsi"],
    ["dil", "di", "edi", "rdi"],
    ["bpl", "bp", "ebp", "rbp"],
    ["spl", "sp", "esp", "rsp"],
    ["r8b", "r8w", "r8d", "r8"],
    ["r9b", "r9w", "r9d", "r9"],
    ["r10b", "r10w", "r10d", "r10"],
    ["r11b", "r11w", "r11d", "r11"],
    ["r12b", "r12w", "r12d", "r12"],
    ["r13b", "r13w", "r13d", "r13"],
    ["r14b", "r14w", "r14d", "r14"],
    ["r15b", "r15w", "r15d", "r15"],
];

impl Gpr {
    pub const COUNT: u8 = 16;

    /// The integer return register of the System V AMD64 ABI.
    pub const RETURN: Gpr = Gpr::Rax;

    pub fn index(self) -> u8 {
        self as u8
    }

    /// # Panics
    ///
    /// Panics when `index >= 16`.
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Gpr::Rax,
            1 => Gpr::Rbx,
            2 => Gpr::Rcx,
            3 => Gpr::Rdx,
            4 => Gpr::Rsi,
            5 => Gpr::Rdi,
            6 => Gpr::Rbp,
            7 => Gpr::Rsp,
            8 => Gpr::R8,
            9 => Gpr::R9,
            10 => Gpr::R10,
            11 => Gpr::R11,
            12 => Gpr::R12,
            13 => Gpr::R13,
            14 => Gpr::R14,
            15 => Gpr::R15,
            other => panic!("invalid gpr index {other}"),
        }
    }

    /// The assembler name of this register at `width`.
    pub fn name(self, width: Width) -> &'static str {
        NAMES[self.index() as usize][width as usize]
    }

    /// Sized naming query: architectural register `index` as the alias
    /// moving `size` bytes.
    pub fn with_size(index: u8, size: u32) -> &'static str {
        Gpr::from_index(index).name(Width::from_size(size))
    }

    /// This register's alias moving `size` bytes.
    pub fn resize(self, size: u32) -> &'static str {
        self.name(Width::from_size(size))
    }

    /// The register holding the scalar argument at `position`, or `None`
    /// when the argument is passed on the stack.
    pub fn scalar_argument(position: usize) -> Option<Gpr> {
        const ARGUMENTS: [Gpr; 6] = [Gpr::Rdi, Gpr::Rsi, Gpr::Rdx, Gpr::Rcx, Gpr::R8, Gpr::R9];
        ARGUMENTS.get(position).copied()
    }

    pub fn is_caller_saved(self) -> bool {
        matches!(
            self,
            Gpr::Rax
                | Gpr::Rcx
                | Gpr::Rdx
                | Gpr::Rsi
                | Gpr::Rdi
                | Gpr::R8
                | Gpr::R9
                | Gpr::R10
                | Gpr::R11
        )
    }

    pub fn is_callee_saved(self) -> bool {
        !self.is_caller_saved()
    }
}

impl std::fmt::Display for Gpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name(Width::Qword))
    }
}
