//! Sample native patches written against the bridge.
//!
//! Each one follows the ARM procedure call standard: arguments in R0-R3,
//! result in R0, return to LR.

use proteus::{
    guest_globals, guest_object,
    patch::{PatchError, PatchResult},
    registers::{RegisterList, R0, R1, R2, R4, R5, SP},
    EmulationContext, GuestMemory, NativePatch, PatchTable, ProcessorState,
};

type Ctx<'a> = EmulationContext<'a, ProcessorState, GuestMemory>;

/// Longest list `list_length` walks before giving up on a cycle.
const MAX_LIST_LENGTH: u32 = 0x10000;

guest_globals! {
    /// Task the scheduler is currently running
    pub pointer CURRENT_TASK: Task = 0x0400_0000;
    /// Number of task switches since boot
    pub word TASK_SWITCHES: u32 = 0x0400_0004;
}

guest_object! {
    pub struct Task {
        pointer next: Task = 0x0,
        word id: u32 = 0x4,
        word priority: i32 = 0x8,
    }
}

guest_object! {
    /// Singly linked list node
    pub struct Node {
        pointer next: Node = 0x0,
    }
}

/// `void memset_words(u32 *dst, u32 value, u32 count)`
fn memset_words(mut ctx: Ctx<'_>) -> PatchResult {
    let dst = ctx.reg(R0);
    let value = ctx.reg(R1);
    let count = ctx.reg(R2);

    for i in 0..count {
        ctx.poke(dst.wrapping_add(i.wrapping_mul(4)), value)?;
    }

    let lr = ctx.lr();

    Ok(ctx.exit(lr))
}

/// `u32 sum_words(const u32 *src, u32 count)`
fn sum_words(mut ctx: Ctx<'_>) -> PatchResult {
    let src = ctx.reg(R0);
    let count = ctx.reg(R1);
    let mut sum = 0u32;

    for i in 0..count {
        sum = sum.wrapping_add(ctx.peek(src.wrapping_add(i.wrapping_mul(4)))?);
    }

    ctx.set_reg(R0, sum);

    let lr = ctx.lr();

    Ok(ctx.exit(lr))
}

/// `void swap_words(u32 *a, u32 *b, u32 count)`
///
/// Keeps the guest's callee-saved R4 and R5 on the guest stack while it uses
/// them as scratch, the way the compiled routine does.
fn swap_words(mut ctx: Ctx<'_>) -> PatchResult {
    let saved = RegisterList::from([R4, R5]);

    ctx.stmdb(SP, saved)?;

    let first = ctx.reg(R0);
    let second = ctx.reg(R1);

    for i in 0..ctx.reg(R2) {
        let a = first.wrapping_add(i.wrapping_mul(4));
        let b = second.wrapping_add(i.wrapping_mul(4));

        ctx.set_reg(R4, ctx.peek(a)?);
        ctx.set_reg(R5, ctx.peek(b)?);
        ctx.poke(a, ctx.reg(R5))?;
        ctx.poke(b, ctx.reg(R4))?;
    }

    ctx.ldmia(SP, saved)?;

    let lr = ctx.lr();

    Ok(ctx.exit(lr))
}

/// `u32 list_length(Node *head)`
fn list_length(mut ctx: Ctx<'_>) -> PatchResult {
    let mut node = Node::at(ctx.reg(R0));
    let mut length = 0;

    while node.address() != 0 && length < MAX_LIST_LENGTH {
        length += 1;
        node = node.next(&ctx)?;
    }

    ctx.set_reg(R0, length);

    let lr = ctx.lr();

    Ok(ctx.exit(lr))
}

/// `u32 current_task_id(void)`, also counts the call as a task switch.
fn current_task_id(mut ctx: Ctx<'_>) -> PatchResult {
    let task = CURRENT_TASK.get(&ctx)?;
    let id = if task.address() == 0 {
        0
    } else {
        task.id(&ctx)?
    };

    let switches = TASK_SWITCHES.get(&ctx)?;
    TASK_SWITCHES.set(&mut ctx, switches.wrapping_add(1))?;

    ctx.set_reg(R0, id);

    let lr = ctx.lr();

    Ok(ctx.exit(lr))
}

/// `void push_task(Task *task, u32 id, i32 priority)`, makes `task` current.
fn push_task(mut ctx: Ctx<'_>) -> PatchResult {
    let task = Task::at(ctx.reg(R0));
    let id = ctx.reg(R1);
    let priority = ctx.reg(R2) as i32;
    let head = CURRENT_TASK.get(&ctx)?;

    task.set_id(&mut ctx, id)?;
    task.set_priority(&mut ctx, priority)?;
    task.set_next(&mut ctx, head)?;
    CURRENT_TASK.set(&mut ctx, task)?;

    let lr = ctx.lr();

    Ok(ctx.exit(lr))
}

/// `i32 highest_priority(void)`, `INT_MIN` when no task is queued.
fn highest_priority(mut ctx: Ctx<'_>) -> PatchResult {
    let mut task = CURRENT_TASK.get(&ctx)?;
    let mut highest = i32::MIN;
    let mut visited = 0;

    while task.address() != 0 && visited < MAX_LIST_LENGTH {
        highest = highest.max(task.priority(&ctx)?);
        task = task.next(&ctx)?;
        visited += 1;
    }

    ctx.set_reg(R0, highest as u32);

    let lr = ctx.lr();

    Ok(ctx.exit(lr))
}

/// `Node *list_reverse(Node *head)`, reverses the list in place.
fn list_reverse(mut ctx: Ctx<'_>) -> PatchResult {
    let mut node = Node::at(ctx.reg(R0));
    let mut reversed = Node::at(0);
    let mut visited = 0;

    while node.address() != 0 && visited < MAX_LIST_LENGTH {
        let next = node.next(&ctx)?;

        node.set_next(&mut ctx, reversed)?;
        reversed = node;
        node = next;
        visited += 1;
    }

    ctx.set_reg(R0, reversed.address());

    let lr = ctx.lr();

    Ok(ctx.exit(lr))
}

pub fn table() -> Result<PatchTable<ProcessorState, GuestMemory>, PatchError> {
    let mut table = PatchTable::new();

    table.register(NativePatch::new("memset_words", 0x0001_0000, memset_words))?;
    table.register(NativePatch::new("sum_words", 0x0001_0040, sum_words))?;
    table.register(NativePatch::new("swap_words", 0x0001_0080, swap_words))?;
    table.register(NativePatch::new("list_length", 0x0001_00C0, list_length))?;
    table.register(NativePatch::new("current_task_id", 0x0001_0100, current_task_id))?;
    table.register(NativePatch::new("push_task", 0x0001_0140, push_task))?;
    table.register(NativePatch::new("highest_priority", 0x0001_0180, highest_priority))?;
    table.register(NativePatch::new("list_reverse", 0x0001_01C0, list_reverse))?;

    Ok(table)
}
