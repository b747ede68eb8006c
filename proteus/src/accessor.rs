//! Typed getters and setters over guest words.
//!
//! A [Global] is bound to a fixed guest address, a [Member] to a byte offset
//! from the base address of a [GuestObject]. Both go through a [Policy] that
//! turns the guest word into a host value and back:
//!
//! - [Word] for values that already fit in 32 bits (integers, flags, enums).
//! - [PointerWidth] for host pointer sized values that travel through a guest
//!   word. Encoding keeps the low 32 bits; anything above is truncated.
//!
//! Nothing is cached. Every `get` reads guest memory, every `set` writes it.

use std::{fmt, marker::PhantomData};

use thiserror::Error;

use crate::memory::{Memory, MemoryFault};

/// A host value that is stored as a guest word as is.
pub trait WordValue: Sized {
    fn from_word(word: u32) -> Self;

    fn into_word(self) -> u32;
}

macro_rules! impl_word_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WordValue for $ty {
                #[inline]
                fn from_word(word: u32) -> Self {
                    word as $ty
                }

                #[inline]
                fn into_word(self) -> u32 {
                    self as u32
                }
            }
        )*
    };
}

impl_word_value!(u32, i32, u16, i16, u8, i8);

impl WordValue for bool {
    fn from_word(word: u32) -> Self {
        word != 0
    }

    fn into_word(self) -> u32 {
        self as u32
    }
}

/// A host value with the width of a host pointer.
pub trait PointerValue: Sized {
    fn from_addr(addr: usize) -> Self;

    fn into_addr(self) -> usize;
}

impl PointerValue for usize {
    fn from_addr(addr: usize) -> Self {
        addr
    }

    fn into_addr(self) -> usize {
        self
    }
}

impl PointerValue for isize {
    fn from_addr(addr: usize) -> Self {
        addr as isize
    }

    fn into_addr(self) -> usize {
        self as usize
    }
}

impl<T> PointerValue for *const T {
    fn from_addr(addr: usize) -> Self {
        addr as *const T
    }

    fn into_addr(self) -> usize {
        self as usize
    }
}

impl<T> PointerValue for *mut T {
    fn from_addr(addr: usize) -> Self {
        addr as *mut T
    }

    fn into_addr(self) -> usize {
        self as usize
    }
}

/// Conversion between a guest word and `T`.
pub trait Policy<T> {
    fn decode(word: u32) -> T;

    fn encode(value: T) -> u32;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Word;

impl<T: WordValue> Policy<T> for Word {
    #[inline]
    fn decode(word: u32) -> T {
        T::from_word(word)
    }

    #[inline]
    fn encode(value: T) -> u32 {
        value.into_word()
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Host value '0x{value:X}' does not fit in a guest word")]
pub struct TruncationError {
    pub value: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerWidth;

impl PointerWidth {
    /// Like [Policy::encode], but refuses values above the 32-bit guest range.
    pub fn try_encode<T: PointerValue>(value: T) -> Result<u32, TruncationError> {
        let addr = value.into_addr();

        u32::try_from(addr).map_err(|_| TruncationError { value: addr })
    }
}

impl<T: PointerValue> Policy<T> for PointerWidth {
    fn decode(word: u32) -> T {
        T::from_addr(word as usize)
    }

    /// Keeps the low 32 bits of the value.
    fn encode(value: T) -> u32 {
        let addr = value.into_addr();
        let word = addr as u32;

        if word as usize != addr {
            log::warn!("host value 0x{addr:X} truncated to guest word 0x{word:08X}");
        }

        word
    }
}

/// A host-side handle for an aggregate living in guest memory.
///
/// The guest base address is the handle's only state.
pub trait GuestObject {
    fn guest_address(&self) -> u32;
}

/// A typed global at a fixed guest address.
pub struct Global<T, P = Word> {
    address: u32,
    _marker: PhantomData<fn() -> (T, P)>,
}

impl<T, P> Global<T, P> {
    pub const fn new(address: u32) -> Self {
        Self {
            address,
            _marker: PhantomData,
        }
    }

    pub const fn address(&self) -> u32 {
        self.address
    }
}

impl<T, P: Policy<T>> Global<T, P> {
    pub fn get(&self, memory: &impl Memory) -> Result<T, MemoryFault> {
        memory.read_word(self.address).map(P::decode)
    }

    pub fn set(&self, memory: &mut impl Memory, value: T) -> Result<(), MemoryFault> {
        memory.write_word(self.address, P::encode(value))
    }
}

impl<T, P> Clone for Global<T, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, P> Copy for Global<T, P> {}

impl<T, P> fmt::Debug for Global<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Global(0x{:08X})", self.address)
    }
}

/// A typed field at a byte offset from a guest object's base address.
pub struct Member<T, P = Word> {
    offset: u32,
    _marker: PhantomData<fn() -> (T, P)>,
}

impl<T, P> Member<T, P> {
    pub const fn new(offset: u32) -> Self {
        Self {
            offset,
            _marker: PhantomData,
        }
    }

    pub const fn offset(&self) -> u32 {
        self.offset
    }

    pub fn address_in(&self, object: &impl GuestObject) -> u32 {
        object.guest_address().wrapping_add(self.offset)
    }
}

impl<T, P: Policy<T>> Member<T, P> {
    pub fn get(&self, object: &impl GuestObject, memory: &impl Memory) -> Result<T, MemoryFault> {
        memory.read_word(self.address_in(object)).map(P::decode)
    }

    pub fn set(
        &self,
        object: &impl GuestObject,
        memory: &mut impl Memory,
        value: T,
    ) -> Result<(), MemoryFault> {
        memory.write_word(self.address_in(object), P::encode(value))
    }
}

impl<T, P> Clone for Member<T, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, P> Copy for Member<T, P> {}

impl<T, P> fmt::Debug for Member<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Member(+0x{:X})", self.offset)
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __guest_policy {
    (word) => {
        $crate::accessor::Word
    };
    (pointer) => {
        $crate::accessor::PointerWidth
    };
}

/// Declares typed guest globals.
///
/// ```
/// proteus::guest_globals! {
///     /// Task currently scheduled
///     pub word CURRENT_TASK_ID: u32 = 0x0C10_0FF8;
///     pub pointer IDLE_HOOK: usize = 0x0C10_0FFC;
/// }
///
/// assert_eq!(CURRENT_TASK_ID.address(), 0x0C10_0FF8);
/// ```
#[macro_export]
macro_rules! guest_globals {
    ($(
        $(#[$meta:meta])*
        $vis:vis $policy:ident $name:ident: $ty:ty = $address:expr;
    )*) => {
        $(
            $(#[$meta])*
            $vis const $name: $crate::accessor::Global<$ty, $crate::__guest_policy!($policy)> =
                $crate::accessor::Global::new($address);
        )*
    };
}

/// Declares a handle for an aggregate living in guest memory, with a getter
/// and a `set_` setter per field.
///
/// ```
/// proteus::guest_object! {
///     /// A node of a singly linked list
///     pub struct Node {
///         pointer next: Node = 0x0,
///         word value: i32 = 0x4,
///     }
/// }
///
/// let node = Node::at(0x0400_0100);
/// assert_eq!(node.address(), 0x0400_0100);
/// ```
#[macro_export]
macro_rules! guest_object {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $policy:ident $field:ident: $ty:ty = $offset:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis struct $name {
            address: u32,
        }

        impl $name {
            pub const fn at(address: u32) -> Self {
                Self { address }
            }

            pub const fn address(&self) -> u32 {
                self.address
            }

            $(
                $(#[$field_meta])*
                pub fn $field(
                    &self,
                    memory: &impl $crate::memory::Memory,
                ) -> ::std::result::Result<$ty, $crate::memory::MemoryFault> {
                    $crate::accessor::Member::<$ty, $crate::__guest_policy!($policy)>::new($offset)
                        .get(self, memory)
                }

                $crate::paste::paste! {
                    pub fn [<set_ $field>](
                        &self,
                        memory: &mut impl $crate::memory::Memory,
                        value: $ty,
                    ) -> ::std::result::Result<(), $crate::memory::MemoryFault> {
                        $crate::accessor::Member::<$ty, $crate::__guest_policy!($policy)>::new($offset)
                            .set(self, memory, value)
                    }
                }
            )*
        }

        impl $crate::accessor::GuestObject for $name {
            fn guest_address(&self) -> u32 {
                self.address
            }
        }

        impl $crate::accessor::PointerValue for $name {
            fn from_addr(addr: usize) -> Self {
                Self { address: addr as u32 }
            }

            fn into_addr(self) -> usize {
                self.address as usize
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::EmulationContext,
        test_support::{make_machine, RAM_START},
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TaskState {
        Ready,
        Blocked,
        Unknown(u32),
    }

    impl WordValue for TaskState {
        fn from_word(word: u32) -> Self {
            match word {
                0 => TaskState::Ready,
                1 => TaskState::Blocked,
                other => TaskState::Unknown(other),
            }
        }

        fn into_word(self) -> u32 {
            match self {
                TaskState::Ready => 0,
                TaskState::Blocked => 1,
                TaskState::Unknown(other) => other,
            }
        }
    }

    crate::guest_globals! {
        word TICKS: u32 = RAM_START + 0x10;
        word DELTA: i32 = RAM_START + 0x14;
        word SMALL: i8 = RAM_START + 0x18;
        word ENABLED: bool = RAM_START + 0x1C;
        word STATE: TaskState = RAM_START + 0x20;
        pointer HOOK: usize = RAM_START + 0x24;
        pointer BUFFER: *const u8 = RAM_START + 0x28;
        word MISSING: u32 = 0x0300_0000;
        word IN_ROM: u32 = 0x40;
    }

    crate::guest_object! {
        /// Kernel task, as laid out in guest memory
        struct Task {
            pointer next: Task = 0x0,
            word id: u32 = 0x4,
            word state: TaskState = 0x8,
        }
    }

    #[test]
    fn global_word_round_trip() {
        let (_, mut memory) = make_machine();

        for value in [0, 1, 0x8000_0000, u32::MAX] {
            TICKS.set(&mut memory, value).unwrap();
            assert_eq!(TICKS.get(&memory), Ok(value));
        }

        for value in [i32::MIN, -1, 0, i32::MAX] {
            DELTA.set(&mut memory, value).unwrap();
            assert_eq!(DELTA.get(&memory), Ok(value));
        }

        for value in [i8::MIN, -1, 0, i8::MAX] {
            SMALL.set(&mut memory, value).unwrap();
            assert_eq!(SMALL.get(&memory), Ok(value));
        }

        ENABLED.set(&mut memory, true).unwrap();
        assert_eq!(ENABLED.get(&memory), Ok(true));
        assert_eq!(memory.read_word(ENABLED.address()), Ok(1));

        STATE.set(&mut memory, TaskState::Blocked).unwrap();
        assert_eq!(STATE.get(&memory), Ok(TaskState::Blocked));
    }

    #[test]
    fn globals_are_not_cached() {
        let (_, mut memory) = make_machine();

        TICKS.set(&mut memory, 5).unwrap();
        memory.write_word(RAM_START + 0x10, 6).unwrap();

        assert_eq!(TICKS.get(&memory), Ok(6));
    }

    #[test]
    fn pointer_round_trip() {
        let (_, mut memory) = make_machine();

        for value in [0usize, 0x1000, 0xFFFF_FFFF] {
            HOOK.set(&mut memory, value).unwrap();
            assert_eq!(HOOK.get(&memory), Ok(value));
        }

        let ptr = 0x0400_0040usize as *const u8;

        BUFFER.set(&mut memory, ptr).unwrap();
        assert_eq!(BUFFER.get(&memory), Ok(ptr));
        assert_eq!(memory.read_word(BUFFER.address()), Ok(0x0400_0040));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn pointer_truncation() {
        let (_, mut memory) = make_machine();
        let wide = 0x0000_0001_0000_1234usize;

        HOOK.set(&mut memory, wide).unwrap();

        assert_eq!(HOOK.get(&memory), Ok(0x1234));
        assert_eq!(
            PointerWidth::try_encode(wide),
            Err(TruncationError { value: wide })
        );
        assert_eq!(PointerWidth::try_encode(0x1234usize), Ok(0x1234));
    }

    #[test]
    fn members_are_independent() {
        let (_, mut memory) = make_machine();
        let first = Task::at(RAM_START + 0x100);
        let second = Task::at(RAM_START + 0x200);

        first.set_id(&mut memory, 1).unwrap();
        second.set_id(&mut memory, 2).unwrap();

        assert_eq!(first.id(&memory), Ok(1));
        assert_eq!(second.id(&memory), Ok(2));
        assert_eq!(memory.read_word(RAM_START + 0x104), Ok(1));
        assert_eq!(memory.read_word(RAM_START + 0x204), Ok(2));
    }

    #[test]
    fn member_handles() {
        let (_, mut memory) = make_machine();
        let first = Task::at(RAM_START + 0x100);
        let second = Task::at(RAM_START + 0x200);

        first.set_next(&mut memory, second).unwrap();
        second.set_state(&mut memory, TaskState::Unknown(7)).unwrap();

        let next = first.next(&memory).unwrap();

        assert_eq!(next, second);
        assert_eq!(next.state(&memory), Ok(TaskState::Unknown(7)));
        assert_eq!(memory.read_word(RAM_START + 0x100), Ok(RAM_START + 0x200));

        let member = Member::<u32>::new(0x4);
        assert_eq!(member.address_in(&first), RAM_START + 0x104);
    }

    #[test]
    fn accessors_through_context() {
        let (mut cpu, mut memory) = make_machine();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);
        let task = Task::at(RAM_START + 0x300);

        TICKS.set(&mut ctx, 99).unwrap();
        task.set_id(&mut ctx, 3).unwrap();

        assert_eq!(TICKS.get(&ctx), Ok(99));
        assert_eq!(ctx.peek(RAM_START + 0x304), Ok(3));
    }

    #[test]
    fn faults_propagate() {
        let (_, mut memory) = make_machine();
        let snapshot: Vec<u8> = memory.regions()[1].ram().as_slice().to_vec();

        assert_eq!(
            MISSING.get(&memory),
            Err(MemoryFault::Unmapped {
                address: 0x0300_0000
            })
        );
        assert_eq!(
            IN_ROM.set(&mut memory, 1),
            Err(MemoryFault::ReadOnly { address: 0x40 })
        );
        assert_eq!(
            Task::at(0x0300_0000).set_id(&mut memory, 1),
            Err(MemoryFault::Unmapped {
                address: 0x0300_0004
            })
        );

        assert_eq!(IN_ROM.get(&memory), Ok(0));
        assert_eq!(memory.regions()[1].ram().as_slice(), snapshot.as_slice());
    }
}
