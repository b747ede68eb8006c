use crate::{
    contract_violation,
    mode::Mode,
    registers::{RegisterBank, R14, R8},
};

/// The processor state a native patch runs against.
///
/// Implementors own the register file; the bridge only ever borrows the bank
/// of the current mode, and re-borrows it on every access.
pub trait Processor {
    /// # Panics
    ///
    /// When the processor has no current bank yet.
    fn current_registers(&self) -> &RegisterBank;

    /// # Panics
    ///
    /// When the processor has no current bank yet.
    fn current_registers_mut(&mut self) -> &mut RegisterBank;

    fn mode(&self) -> Option<Mode>;
}

// R8..R14
const HIGH_COUNT: usize = 7;
// R8..R12
const SHARED_HIGH_COUNT: usize = 5;

/// Reference processor with ARMv4 register banking.
///
/// R0-R7 and R15 are shared by every mode. FIQ banks R8-R14, the other
/// exception modes bank R13-R14, User and System share one bank.
#[derive(Debug, Clone, Default)]
pub struct ProcessorState {
    mode: Option<Mode>,
    current: RegisterBank,
    user_high: [u32; HIGH_COUNT],
    fiq_high: [u32; HIGH_COUNT],
    banked_sp_lr: [[u32; 2]; 4],
}

impl ProcessorState {
    /// A processor without a current bank. Call [ProcessorState::reset] or
    /// [ProcessorState::set_mode] before touching registers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes every bank and enters Supervisor mode, as the hardware does on reset.
    pub fn reset(&mut self) {
        *self = Self {
            mode: Some(Mode::Supervisor),
            ..Self::default()
        };

        log::debug!("processor reset into {:?} mode", Mode::Supervisor);
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode == Some(mode) {
            return;
        }

        if let Some(old) = self.mode {
            self.save_bank(old);
        }

        self.load_bank(mode);

        log::trace!("processor mode {:?} -> {:?}", self.mode, mode);

        self.mode = Some(mode);
    }

    fn sp_lr_slot(mode: Mode) -> Option<usize> {
        match mode {
            Mode::User | Mode::System | Mode::FIQ => None,
            Mode::IRQ => Some(0),
            Mode::Supervisor => Some(1),
            Mode::Abort => Some(2),
            Mode::Undefined => Some(3),
        }
    }

    fn save_bank(&mut self, mode: Mode) {
        let high = &self.current.as_slice()[R8.index()..=R14.index()];

        if mode == Mode::FIQ {
            self.fiq_high.copy_from_slice(high);
            return;
        }

        self.user_high[..SHARED_HIGH_COUNT].copy_from_slice(&high[..SHARED_HIGH_COUNT]);

        match Self::sp_lr_slot(mode) {
            Some(slot) => {
                self.banked_sp_lr[slot].copy_from_slice(&high[SHARED_HIGH_COUNT..]);
            }
            None => {
                self.user_high[SHARED_HIGH_COUNT..].copy_from_slice(&high[SHARED_HIGH_COUNT..]);
            }
        }
    }

    fn load_bank(&mut self, mode: Mode) {
        let high = &mut self.current.as_mut_slice()[R8.index()..=R14.index()];

        if mode == Mode::FIQ {
            high.copy_from_slice(&self.fiq_high);
            return;
        }

        high[..SHARED_HIGH_COUNT].copy_from_slice(&self.user_high[..SHARED_HIGH_COUNT]);

        match Self::sp_lr_slot(mode) {
            Some(slot) => high[SHARED_HIGH_COUNT..].copy_from_slice(&self.banked_sp_lr[slot]),
            None => high[SHARED_HIGH_COUNT..].copy_from_slice(&self.user_high[SHARED_HIGH_COUNT..]),
        }
    }
}

impl Processor for ProcessorState {
    fn current_registers(&self) -> &RegisterBank {
        if self.mode.is_none() {
            contract_violation("register access before the processor has a current bank");
        }

        &self.current
    }

    fn current_registers_mut(&mut self) -> &mut RegisterBank {
        if self.mode.is_none() {
            contract_violation("register access before the processor has a current bank");
        }

        &mut self.current
    }

    fn mode(&self) -> Option<Mode> {
        self.mode
    }
}
