//! Types and the type interner.
//!
//! Types are interned: structurally equal types share one [`TypeId`], so
//! type equality everywhere else in the compiler is an integer comparison.
//! The scalar types are fixed singletons created with the interner; tuple
//! and function types are deduplicated by a linear structural-equality
//! search over the compound region, which stays tiny for any realistic
//! program.

use std::fmt::Write;

use expc_util::{define_idx, IndexVec};

define_idx!(
    /// Handle to an interned [`Type`].
    TypeId
);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Nil,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Tuple(Vec<TypeId>),
    Function {
        return_type: TypeId,
        arguments: Vec<TypeId>,
    },
}

impl Type {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
        )
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }
}

/// Index of the last scalar singleton; everything above is compound.
const SCALAR_COUNT: usize = 10;

pub struct TypeInterner {
    types: IndexVec<TypeId, Type>,
}

impl TypeInterner {
    pub fn new() -> Self {
        let mut types = IndexVec::with_capacity(SCALAR_COUNT);
        types.push(Type::Nil);
        types.push(Type::Bool);
        types.push(Type::I8);
        types.push(Type::I16);
        types.push(Type::I32);
        types.push(Type::I64);
        types.push(Type::U8);
        types.push(Type::U16);
        types.push(Type::U32);
        types.push(Type::U64);
        Self { types }
    }

    pub fn nil(&self) -> TypeId {
        TypeId(0)
    }

    pub fn boolean(&self) -> TypeId {
        TypeId(1)
    }

    pub fn i8(&self) -> TypeId {
        TypeId(2)
    }

    pub fn i16(&self) -> TypeId {
        TypeId(3)
    }

    pub fn i32(&self) -> TypeId {
        TypeId(4)
    }

    pub fn i64(&self) -> TypeId {
        TypeId(5)
    }

    pub fn u8(&self) -> TypeId {
        TypeId(6)
    }

    pub fn u16(&self) -> TypeId {
        TypeId(7)
    }

    pub fn u32(&self) -> TypeId {
        TypeId(8)
    }

    pub fn u64(&self) -> TypeId {
        TypeId(9)
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id]
    }

    pub fn tuple(&mut self, elements: Vec<TypeId>) -> TypeId {
        self.intern(Type::Tuple(elements))
    }

    pub fn function(&mut self, return_type: TypeId, arguments: Vec<TypeId>) -> TypeId {
        self.intern(Type::Function {
            return_type,
            arguments,
        })
    }

    fn intern(&mut self, ty: Type) -> TypeId {
        for (id, existing) in self.types.iter_enumerated().skip(SCALAR_COUNT) {
            if *existing == ty {
                return id;
            }
        }
        self.types.push(ty)
    }

    /// Size in bytes of a value of this type in a stack slot or register.
    ///
    /// Scalars conservatively occupy a full word; a tuple is laid out as
    /// its elements back to back.
    pub fn size_of(&self, id: TypeId) -> u32 {
        match self.get(id) {
            Type::Tuple(elements) => elements.iter().map(|&e| self.size_of(e)).sum(),
            _ => 8,
        }
    }

    /// Byte offset of element `index` within a value of tuple type `id`.
    ///
    /// # Panics
    ///
    /// Panics when `id` is not a tuple type or `index` is out of bounds.
    pub fn tuple_offset(&self, id: TypeId, index: u32) -> u32 {
        let Type::Tuple(elements) = self.get(id) else {
            panic!("tuple_offset of non-tuple type");
        };
        assert!((index as usize) < elements.len());
        elements[..index as usize]
            .iter()
            .map(|&e| self.size_of(e))
            .sum()
    }

    /// Render `id` for diagnostics.
    pub fn display(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.write_type(&mut out, id);
        out
    }

    fn write_type(&self, out: &mut String, id: TypeId) {
        match self.get(id) {
            Type::Nil => out.push_str("nil"),
            Type::Bool => out.push_str("bool"),
            Type::I8 => out.push_str("i8"),
            Type::I16 => out.push_str("i16"),
            Type::I32 => out.push_str("i32"),
            Type::I64 => out.push_str("i64"),
            Type::U8 => out.push_str("u8"),
            Type::U16 => out.push_str("u16"),
            Type::U32 => out.push_str("u32"),
            Type::U64 => out.push_str("u64"),
            Type::Tuple(elements) => {
                out.push('(');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(out, *element);
                }
                out.push(')');
            }
            Type::Function {
                return_type,
                arguments,
            } => {
                out.push_str("fn(");
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(out, *argument);
                }
                let _ = write!(out, ") -> ");
                self.write_type(out, *return_type);
            }
        }
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}
