//! The linear-scan register allocator.
//!
//! Allocation is interleaved with instruction selection: codegen expires
//! dead lifetimes at each block index, then asks for a placement for the
//! instruction's result. Placements prefer registers; when the pool is
//! exhausted the active lifetime ending last loses its register (it will
//! not be needed for the longest time) and moves to a fresh stack slot,
//! with the displacing `mov` appended to the bytecode being built.
//!
//! The active list is kept sorted by increasing `last_use`, so expiry
//! stops at the first entry that is still live, and the spill victim is
//! the rear-most register-resident entry.

use expc_ir::{Function, Lifetime, LocalId};
use expc_util::Idx;

use super::bytecode::{X64Bytecode, X64Operand};
use super::gprp::GprPool;
use super::registers::Gpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Gpr(Gpr),
    /// An `rbp`-relative stack slot. Locals sit below the frame pointer
    /// (negative offsets); incoming stack arguments sit above it.
    Stack { offset: i32 },
}

impl Location {
    pub fn operand(self) -> X64Operand {
        match self {
            Location::Gpr(gpr) => X64Operand::Gpr(gpr),
            Location::Stack { offset } => X64Operand::Memory {
                base: Gpr::Rbp,
                offset,
            },
        }
    }

    pub fn is_gpr(self) -> bool {
        matches!(self, Location::Gpr(_))
    }

    pub fn is_stack(self) -> bool {
        matches!(self, Location::Stack { .. })
    }
}

/// One live SSA local and where it currently is.
#[derive(Debug, Clone, Copy)]
pub struct ActiveAllocation {
    pub ssa: LocalId,
    pub lifetime: Lifetime,
    pub location: Location,
    /// Frame bytes this allocation owns; zero for registers and for
    /// incoming stack arguments (their storage belongs to the caller).
    pub size: u32,
}

pub struct Allocator {
    pool: GprPool,
    /// Per-SSA lifetimes copied from the function.
    lifetimes: Vec<Lifetime>,
    /// Live allocations, sorted by increasing `lifetime.last_use`.
    active: Vec<ActiveAllocation>,
    active_stack_size: u32,
    /// Peak of `active_stack_size`; becomes the frame size.
    stack_size: u32,
}

impl Allocator {
    pub fn new(function: &Function) -> Self {
        let mut pool = GprPool::new();
        // the stack and frame pointers are never handed to locals
        pool.acquire(Gpr::Rsp);
        pool.acquire(Gpr::Rbp);
        Self {
            pool,
            lifetimes: function.locals.iter().map(|local| local.lifetime).collect(),
            active: Vec::new(),
            active_stack_size: 0,
            stack_size: 0,
        }
    }

    /// Bind each formal argument to its System V position, with a
    /// whole-function lifetime so the main sweep can spill it like any
    /// other allocation.
    pub fn allocate_formal_arguments(&mut self, function: &Function) {
        let whole = Lifetime::new(0, function.block.len());
        for (position, &argument) in function.arguments.iter().enumerate() {
            match Gpr::scalar_argument(position) {
                Some(gpr) => {
                    self.pool.acquire(gpr);
                    self.insert_active(ActiveAllocation {
                        ssa: argument,
                        lifetime: whole,
                        location: Location::Gpr(gpr),
                        size: 0,
                    });
                }
                None => {
                    // above the saved rbp and return address
                    let offset = 16 + 8 * (position as i32 - 6);
                    self.insert_active(ActiveAllocation {
                        ssa: argument,
                        lifetime: whole,
                        location: Location::Stack { offset },
                        size: 0,
                    });
                }
            }
        }
    }

    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    pub fn active_stack_size(&self) -> u32 {
        self.active_stack_size
    }

    pub fn pool(&self) -> &GprPool {
        &self.pool
    }

    pub fn active(&self) -> &[ActiveAllocation] {
        &self.active
    }

    fn lifetime(&self, ssa: LocalId) -> Lifetime {
        self.lifetimes[ssa.index()]
    }

    /// Release every allocation whose lifetime ended before `index`.
    pub fn expire_old_lifetimes(&mut self, index: u32) {
        while let Some(first) = self.active.first() {
            // sorted by last_use: the first live entry ends the walk
            if first.lifetime.last_use >= index {
                return;
            }
            let expired = self.active.remove(0);
            match expired.location {
                Location::Gpr(gpr) => self.pool.release(gpr),
                Location::Stack { .. } => self.active_stack_size -= expired.size,
            }
        }
    }

    /// The live allocation of `ssa`.
    ///
    /// # Panics
    ///
    /// Panics when `ssa` is not active; the validator guarantees every
    /// operand read happens inside its lifetime.
    pub fn allocation_of(&self, ssa: LocalId) -> ActiveAllocation {
        *self
            .active
            .iter()
            .find(|allocation| allocation.ssa == ssa)
            .expect("operand read outside its lifetime")
    }

    pub fn location_of(&self, ssa: LocalId) -> Location {
        self.allocation_of(ssa).location
    }

    fn occupant_of(&self, gpr: Gpr) -> Option<LocalId> {
        self.active
            .iter()
            .find(|allocation| allocation.location == Location::Gpr(gpr))
            .map(|allocation| allocation.ssa)
    }

    fn insert_active(&mut self, allocation: ActiveAllocation) {
        let position = self
            .active
            .iter()
            .position(|entry| entry.lifetime.last_use > allocation.lifetime.last_use)
            .unwrap_or(self.active.len());
        self.active.insert(position, allocation);
    }

    fn remove_active(&mut self, ssa: LocalId) -> ActiveAllocation {
        let position = self
            .active
            .iter()
            .position(|allocation| allocation.ssa == ssa)
            .expect("removing an inactive allocation");
        self.active.remove(position)
    }

    fn entry_mut(&mut self, ssa: LocalId) -> &mut ActiveAllocation {
        self.active
            .iter_mut()
            .find(|allocation| allocation.ssa == ssa)
            .expect("updating an inactive allocation")
    }

    /// Reserve `size` fresh frame bytes, returning their `rbp`-relative
    /// offset.
    fn bump_stack(&mut self, size: u32) -> i32 {
        self.active_stack_size += size;
        if self.stack_size < self.active_stack_size {
            self.stack_size = self.active_stack_size;
        }
        -(self.active_stack_size as i32)
    }

    /// Place the result local of the current instruction: a register
    /// when one is free, otherwise steal from the active allocation with
    /// the largest `last_use` (spilling it), or fall back to a fresh
    /// stack slot when the new lifetime is itself the longest.
    pub fn allocate(&mut self, ssa: LocalId, bc: &mut X64Bytecode) -> Location {
        let lifetime = self.lifetime(ssa);

        if let Some(gpr) = self.pool.allocate() {
            let location = Location::Gpr(gpr);
            self.insert_active(ActiveAllocation {
                ssa,
                lifetime,
                location,
                size: 0,
            });
            return location;
        }

        if let Some(position) = self.active.iter().rposition(|entry| entry.location.is_gpr()) {
            if self.active[position].lifetime.last_use > lifetime.last_use {
                let Location::Gpr(gpr) = self.active[position].location else {
                    unreachable!()
                };
                let offset = self.bump_stack(8);
                bc.append_mov(
                    Location::Stack { offset }.operand(),
                    X64Operand::Gpr(gpr),
                );
                self.active[position].location = Location::Stack { offset };
                self.active[position].size = 8;
                let location = Location::Gpr(gpr);
                self.insert_active(ActiveAllocation {
                    ssa,
                    lifetime,
                    location,
                    size: 0,
                });
                return location;
            }
        }

        let offset = self.bump_stack(8);
        let location = Location::Stack { offset };
        self.insert_active(ActiveAllocation {
            ssa,
            lifetime,
            location,
            size: 8,
        });
        location
    }

    /// Place `ssa` in a stack region of `size` bytes (aggregates never
    /// live in registers).
    pub fn allocate_stack_region(&mut self, ssa: LocalId, size: u32) -> Location {
        let lifetime = self.lifetime(ssa);
        let offset = self.bump_stack(size);
        let location = Location::Stack { offset };
        self.insert_active(ActiveAllocation {
            ssa,
            lifetime,
            location,
            size,
        });
        location
    }

    /// Place `ssa` in the home of `source`, enabling the two-operand
    /// in-place forms. When `source`'s lifetime ends at `index` it is
    /// simply replaced; when it lives on, it is first moved aside (its
    /// old home still holds its value, which is exactly what the
    /// in-place operation consumes).
    pub fn allocate_from_active(
        &mut self,
        ssa: LocalId,
        source: LocalId,
        index: u32,
        bc: &mut X64Bytecode,
    ) -> Location {
        let lifetime = self.lifetime(ssa);
        let entry = self.allocation_of(source);

        if entry.lifetime.last_use <= index {
            let entry = self.remove_active(source);
            self.insert_active(ActiveAllocation {
                ssa,
                lifetime,
                location: entry.location,
                size: entry.size,
            });
            return entry.location;
        }

        let new_location = self.relocation_target(entry.location, bc);
        bc.append_mov(new_location.operand(), entry.location.operand());
        let moved = self.entry_mut(source);
        let old_location = moved.location;
        let old_size = moved.size;
        moved.location = new_location;
        moved.size = match new_location {
            Location::Stack { .. } => 8,
            Location::Gpr(_) => 0,
        };
        // the old home (register bit or frame bytes) passes to the new
        // local unchanged
        self.insert_active(ActiveAllocation {
            ssa,
            lifetime,
            location: old_location,
            size: old_size,
        });
        old_location
    }

    /// Force `ssa` into `gpr`, evicting any current occupant.
    pub fn allocate_to_gpr(&mut self, ssa: LocalId, gpr: Gpr, bc: &mut X64Bytecode) -> Location {
        let lifetime = self.lifetime(ssa);
        self.acquire_gpr(gpr, bc);
        let location = Location::Gpr(gpr);
        self.insert_active(ActiveAllocation {
            ssa,
            lifetime,
            location,
            size: 0,
        });
        location
    }

    /// Acquire any register, spilling the longest-remaining active
    /// allocation when none is free. The register is returned acquired
    /// but unowned; the caller either binds a local to it or releases
    /// it.
    pub fn acquire_any_gpr(&mut self, bc: &mut X64Bytecode) -> Gpr {
        if let Some(gpr) = self.pool.allocate() {
            return gpr;
        }
        self.spill_for_gpr(bc)
    }

    /// Force `gpr` free of any active occupant and mark it acquired.
    pub fn acquire_gpr(&mut self, gpr: Gpr, bc: &mut X64Bytecode) {
        if self.pool.is_acquired(gpr) {
            match self.occupant_of(gpr) {
                Some(occupant) => self.reallocate_active(occupant, bc),
                // already pinned with no owner: a scratch we hold
                None => return,
            }
        }
        self.pool.acquire(gpr);
    }

    /// Release `gpr`, first moving any active occupant elsewhere.
    pub fn release_gpr(&mut self, gpr: Gpr, bc: &mut X64Bytecode) {
        match self.occupant_of(gpr) {
            // reallocation releases the old register itself
            Some(occupant) => self.reallocate_active(occupant, bc),
            None => self.pool.release(gpr),
        }
    }

    /// Move `ssa` to a new location (register preferred), emitting the
    /// `mov` and releasing its old home.
    pub fn reallocate_active(&mut self, ssa: LocalId, bc: &mut X64Bytecode) {
        let entry = self.allocation_of(ssa);
        let new_location = self.relocation_target(entry.location, bc);
        bc.append_mov(new_location.operand(), entry.location.operand());
        match entry.location {
            Location::Gpr(gpr) => self.pool.release(gpr),
            Location::Stack { .. } => self.active_stack_size -= entry.size,
        }
        let moved = self.entry_mut(ssa);
        moved.location = new_location;
        moved.size = match new_location {
            Location::Stack { .. } => 8,
            Location::Gpr(_) => 0,
        };
    }

    /// Somewhere to move a value currently at `from`: a free register
    /// when possible, a fresh stack slot when `from` is a register, and
    /// otherwise a register freed by spilling (memory-to-memory moves do
    /// not exist).
    fn relocation_target(&mut self, from: Location, bc: &mut X64Bytecode) -> Location {
        match self.pool.allocate() {
            Some(gpr) => Location::Gpr(gpr),
            None if from.is_gpr() => Location::Stack {
                offset: self.bump_stack(8),
            },
            None => Location::Gpr(self.spill_for_gpr(bc)),
        }
    }

    fn spill_for_gpr(&mut self, bc: &mut X64Bytecode) -> Gpr {
        let position = self
            .active
            .iter()
            .rposition(|entry| entry.location.is_gpr())
            .expect("no spillable register while the pool is exhausted");
        let Location::Gpr(gpr) = self.active[position].location else {
            unreachable!()
        };
        let offset = self.bump_stack(8);
        bc.append_mov(Location::Stack { offset }.operand(), X64Operand::Gpr(gpr));
        self.active[position].location = Location::Stack { offset };
        self.active[position].size = 8;
        // the bit stays set; ownership passes to the caller
        gpr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expc_ir::Function;

    /// A function with `count` locals whose lifetimes all span
    /// `[0, length)`, so nothing expires during the test.
    fn function_with_locals(count: usize, length: u32) -> Function {
        let mut function = Function::new();
        for _ in 0..count {
            let id = function.new_local(None);
            function.local_mut(id).lifetime = Lifetime::new(0, length);
        }
        function
    }

    fn exclusive(allocator: &Allocator) {
        // every active register is acquired exactly once, and rsp/rbp
        // are always reserved
        let mut seen_gprs = Vec::new();
        let mut seen_offsets = Vec::new();
        for entry in allocator.active() {
            match entry.location {
                Location::Gpr(gpr) => {
                    assert!(allocator.pool().is_acquired(gpr));
                    assert!(!seen_gprs.contains(&gpr), "register double-booked");
                    seen_gprs.push(gpr);
                }
                Location::Stack { offset } => {
                    assert!(!seen_offsets.contains(&offset), "stack slot double-booked");
                    seen_offsets.push(offset);
                }
            }
        }
        assert!(allocator.pool().is_acquired(Gpr::Rsp));
        assert!(allocator.pool().is_acquired(Gpr::Rbp));
        // with no scratches held, the pool is exactly the active
        // registers plus rsp and rbp
        assert_eq!(
            allocator.pool().bits().count_set() as usize,
            seen_gprs.len() + 2
        );
    }

    #[test]
    fn test_allocate_prefers_registers() {
        let function = function_with_locals(3, 10);
        let mut allocator = Allocator::new(&function);
        let mut bc = X64Bytecode::new();
        for id in function.locals.indices() {
            assert!(allocator.allocate(id, &mut bc).is_gpr());
        }
        assert!(bc.is_empty());
        exclusive(&allocator);
    }

    #[test]
    fn test_exhaustion_spills_to_stack() {
        // 14 allocatable registers; the 15th local must go to memory
        let function = function_with_locals(15, 10);
        let mut allocator = Allocator::new(&function);
        let mut bc = X64Bytecode::new();
        let locations: Vec<_> = function
            .locals
            .indices()
            .map(|id| allocator.allocate(id, &mut bc))
            .collect();
        assert_eq!(locations.iter().filter(|l| l.is_gpr()).count(), 14);
        assert_eq!(locations.iter().filter(|l| l.is_stack()).count(), 1);
        assert_eq!(allocator.stack_size(), 8);
        exclusive(&allocator);
    }

    #[test]
    fn test_spill_steals_from_longest_lifetime() {
        let mut function = Function::new();
        // 14 locals ending late, then one short-lived local
        for _ in 0..14 {
            let id = function.new_local(None);
            function.local_mut(id).lifetime = Lifetime::new(0, 100);
        }
        let short = function.new_local(None);
        function.local_mut(short).lifetime = Lifetime::new(1, 2);

        let mut allocator = Allocator::new(&function);
        let mut bc = X64Bytecode::new();
        let mut long_ids = function.locals.indices().collect::<Vec<_>>();
        let short_id = long_ids.pop().unwrap();
        for id in long_ids {
            allocator.allocate(id, &mut bc);
        }
        assert!(bc.is_empty());

        // the short lifetime ends before every active one, so it steals
        // a register and the victim moves to the stack
        let location = allocator.allocate(short_id, &mut bc);
        assert!(location.is_gpr());
        assert_eq!(bc.len(), 1, "one displacing mov");
        assert_eq!(allocator.stack_size(), 8);
        exclusive(&allocator);
    }

    #[test]
    fn test_expiry_releases_resources() {
        let mut function = Function::new();
        let a = function.new_local(None);
        function.local_mut(a).lifetime = Lifetime::new(0, 1);
        let b = function.new_local(None);
        function.local_mut(b).lifetime = Lifetime::new(0, 5);

        let mut allocator = Allocator::new(&function);
        let mut bc = X64Bytecode::new();
        let Location::Gpr(gpr_a) = allocator.allocate(a, &mut bc) else {
            panic!("expected register");
        };
        allocator.allocate(b, &mut bc);

        allocator.expire_old_lifetimes(2);
        assert!(!allocator.pool().is_acquired(gpr_a));
        assert_eq!(allocator.active().len(), 1);
        exclusive(&allocator);
    }

    #[test]
    fn test_allocate_from_active_reuses_dead_home() {
        let mut function = Function::new();
        let a = function.new_local(None);
        function.local_mut(a).lifetime = Lifetime::new(0, 1);
        let b = function.new_local(None);
        function.local_mut(b).lifetime = Lifetime::new(1, 3);

        let mut allocator = Allocator::new(&function);
        let mut bc = X64Bytecode::new();
        let home = allocator.allocate(a, &mut bc);
        // a dies at index 1, so b takes over in place without a mov
        let reused = allocator.allocate_from_active(b, a, 1, &mut bc);
        assert_eq!(home, reused);
        assert!(bc.is_empty());
        assert_eq!(allocator.active().len(), 1);
        exclusive(&allocator);
    }

    #[test]
    fn test_allocate_from_active_moves_live_source() {
        let mut function = Function::new();
        let a = function.new_local(None);
        function.local_mut(a).lifetime = Lifetime::new(0, 9);
        let b = function.new_local(None);
        function.local_mut(b).lifetime = Lifetime::new(1, 3);

        let mut allocator = Allocator::new(&function);
        let mut bc = X64Bytecode::new();
        let home = allocator.allocate(a, &mut bc);
        // a outlives index 1: it must be moved aside first
        let taken = allocator.allocate_from_active(b, a, 1, &mut bc);
        assert_eq!(home, taken);
        assert_eq!(bc.len(), 1, "one preserving mov");
        assert_ne!(allocator.location_of(a), taken);
        exclusive(&allocator);
    }

    #[test]
    fn test_allocate_to_gpr_evicts_occupant() {
        let function = function_with_locals(2, 10);
        let mut allocator = Allocator::new(&function);
        let mut bc = X64Bytecode::new();
        let a = LocalId(0);
        let b = LocalId(1);
        // rax is the first register handed out
        assert_eq!(allocator.allocate(a, &mut bc), Location::Gpr(Gpr::Rax));
        let location = allocator.allocate_to_gpr(b, Gpr::Rax, &mut bc);
        assert_eq!(location, Location::Gpr(Gpr::Rax));
        assert_ne!(allocator.location_of(a), Location::Gpr(Gpr::Rax));
        assert_eq!(bc.len(), 1, "occupant moved aside");
        exclusive(&allocator);
    }

    #[test]
    fn test_spill_monotonicity() {
        // peak stack size never decreases, and always dominates the
        // active stack size
        let function = function_with_locals(20, 10);
        let mut allocator = Allocator::new(&function);
        let mut bc = X64Bytecode::new();
        let mut peak = 0;
        for id in function.locals.indices() {
            allocator.allocate(id, &mut bc);
            assert!(allocator.stack_size() >= peak);
            assert!(allocator.stack_size() >= allocator.active_stack_size());
            peak = allocator.stack_size();
        }
    }

    #[test]
    fn test_formal_arguments_preallocated() {
        let mut function = Function::new();
        let types = expc_ir::TypeInterner::new();
        let x = function.new_argument(expc_util::Symbol::intern("x"), types.i64());
        let y = function.new_argument(expc_util::Symbol::intern("y"), types.i64());
        function.local_mut(x).lifetime = Lifetime::new(0, 1);
        function.local_mut(y).lifetime = Lifetime::new(0, 1);

        let mut allocator = Allocator::new(&function);
        allocator.allocate_formal_arguments(&function);
        assert_eq!(allocator.location_of(x), Location::Gpr(Gpr::Rdi));
        assert_eq!(allocator.location_of(y), Location::Gpr(Gpr::Rsi));
        exclusive(&allocator);
    }
}
