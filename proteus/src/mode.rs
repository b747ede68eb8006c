/// ARMv4 processor modes, encoded as the low five bits of the CPSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    User = 0x10,
    FIQ = 0x11,
    IRQ = 0x12,
    Supervisor = 0x13,
    Abort = 0x17,
    Undefined = 0x1B,
    System = 0x1F,
}

impl Mode {
    pub fn as_u8(self) -> u8 {
        match self {
            Mode::User => 0b10000,
            Mode::FIQ => 0b10001,
            Mode::IRQ => 0b10010,
            Mode::Supervisor => 0b10011,
            Mode::Abort => 0b10111,
            Mode::Undefined => 0b11011,
            Mode::System => 0b11111,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0b10000 => Some(Self::User),
            0b10001 => Some(Self::FIQ),
            0b10010 => Some(Self::IRQ),
            0b10011 => Some(Self::Supervisor),
            0b10111 => Some(Self::Abort),
            0b11011 => Some(Self::Undefined),
            0b11111 => Some(Self::System),
            _ => None,
        }
    }

    pub fn is_privileged(self) -> bool {
        self != Mode::User
    }
}
