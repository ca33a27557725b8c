//! Interned IR type descriptors and the type algebra.
//!
//! Primitive constructors always return the same canonical [`TypeId`] for a
//! given pool; derived constructors (`pointer_to`, `array_of`, ...) mint a
//! fresh descriptor per call, and equality is deep structural comparison,
//! so two independently built `pointer(int32)` descriptors compare equal.
//!
//! The binary-result rule: comparisons and logical and/or produce `bool`;
//! arithmetic on numerics produces the wider operand (`float64` over
//! `float32` over every integer; among integers the larger byte size wins
//! and ties go to the left operand); anything else produces `unknown`,
//! which is a recoverable type-check failure rather than a crash.

use bitflags::bitflags;

use crate::module::Opcode;
use crate::pool::{Handle, Pool};

bitflags! {
    /// Modifier flags carried on every type descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeModifiers: u8 {
        const CONST     = 0b001;
        const VOLATILE  = 0b010;
        const REFERENCE = 0b100;
    }
}

/// Handle to an interned type descriptor.
pub type TypeId = Handle<TypeDesc>;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum TypeKind {
    Void,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bool,
    Char,
    Str,
    Pointer {
        pointee: TypeId,
    },
    Array {
        element: TypeId,
        len: u32,
    },
    Function {
        params: Vec<TypeId>,
        ret: TypeId,
    },
    Struct {
        name: String,
        fields: Vec<(String, TypeId)>,
    },
    Class {
        name: String,
        fields: Vec<(String, TypeId)>,
    },
    Any,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeDesc {
    pub kind: TypeKind,
    pub size: u32,
    pub align: u32,
    pub modifiers: TypeModifiers,
}

// Canonical slots for the interned primitives, in cache order.
const PRIM_VOID: usize = 0;
const PRIM_INT8: usize = 1;
const PRIM_INT16: usize = 2;
const PRIM_INT32: usize = 3;
const PRIM_INT64: usize = 4;
const PRIM_UINT8: usize = 5;
const PRIM_UINT16: usize = 6;
const PRIM_UINT32: usize = 7;
const PRIM_UINT64: usize = 8;
const PRIM_FLOAT32: usize = 9;
const PRIM_FLOAT64: usize = 10;
const PRIM_BOOL: usize = 11;
const PRIM_CHAR: usize = 12;
const PRIM_STR: usize = 13;
const PRIM_ANY: usize = 14;
const PRIM_UNKNOWN: usize = 15;
const PRIM_COUNT: usize = 16;

/// Pool of interned type descriptors.
pub struct TypePool {
    pool: Pool<TypeDesc>,
    primitives: [Option<TypeId>; PRIM_COUNT],
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePool {
    pub fn new() -> Self {
        Self {
            pool: Pool::new("type"),
            primitives: [None; PRIM_COUNT],
        }
    }

    pub fn get(&self, id: TypeId) -> &TypeDesc {
        self.pool.get(id)
    }

    pub fn stats(&self) -> crate::pool::PoolStats {
        self.pool.stats()
    }

    fn intern_primitive(&mut self, slot: usize, kind: TypeKind, size: u32, align: u32) -> TypeId {
        if let Some(id) = self.primitives[slot] {
            return id;
        }
        let id = self.fresh(kind, size, align);
        self.primitives[slot] = Some(id);
        id
    }

    fn fresh(&mut self, kind: TypeKind, size: u32, align: u32) -> TypeId {
        let id = self.pool.alloc();
        *self.pool.get_mut(id) = TypeDesc {
            kind,
            size,
            align,
            modifiers: TypeModifiers::empty(),
        };
        id
    }

    // ---------------------------------------------------------------------
    // Primitive constructors (canonical per pool)
    // ---------------------------------------------------------------------

    pub fn void(&mut self) -> TypeId {
        self.intern_primitive(PRIM_VOID, TypeKind::Void, 0, 1)
    }
    pub fn int8(&mut self) -> TypeId {
        self.intern_primitive(PRIM_INT8, TypeKind::Int8, 1, 1)
    }
    pub fn int16(&mut self) -> TypeId {
        self.intern_primitive(PRIM_INT16, TypeKind::Int16, 2, 2)
    }
    pub fn int32(&mut self) -> TypeId {
        self.intern_primitive(PRIM_INT32, TypeKind::Int32, 4, 4)
    }
    pub fn int64(&mut self) -> TypeId {
        self.intern_primitive(PRIM_INT64, TypeKind::Int64, 8, 8)
    }
    pub fn uint8(&mut self) -> TypeId {
        self.intern_primitive(PRIM_UINT8, TypeKind::Uint8, 1, 1)
    }
    pub fn uint16(&mut self) -> TypeId {
        self.intern_primitive(PRIM_UINT16, TypeKind::Uint16, 2, 2)
    }
    pub fn uint32(&mut self) -> TypeId {
        self.intern_primitive(PRIM_UINT32, TypeKind::Uint32, 4, 4)
    }
    pub fn uint64(&mut self) -> TypeId {
        self.intern_primitive(PRIM_UINT64, TypeKind::Uint64, 8, 8)
    }
    pub fn float32(&mut self) -> TypeId {
        self.intern_primitive(PRIM_FLOAT32, TypeKind::Float32, 4, 4)
    }
    pub fn float64(&mut self) -> TypeId {
        self.intern_primitive(PRIM_FLOAT64, TypeKind::Float64, 8, 8)
    }
    pub fn bool(&mut self) -> TypeId {
        self.intern_primitive(PRIM_BOOL, TypeKind::Bool, 1, 1)
    }
    pub fn char(&mut self) -> TypeId {
        self.intern_primitive(PRIM_CHAR, TypeKind::Char, 1, 1)
    }
    /// Strings are pointer-sized handles at the IR level.
    pub fn string(&mut self) -> TypeId {
        self.intern_primitive(PRIM_STR, TypeKind::Str, 8, 8)
    }
    pub fn any(&mut self) -> TypeId {
        self.intern_primitive(PRIM_ANY, TypeKind::Any, 8, 8)
    }
    pub fn unknown(&mut self) -> TypeId {
        self.intern_primitive(PRIM_UNKNOWN, TypeKind::Unknown, 0, 1)
    }

    // ---------------------------------------------------------------------
    // Derived constructors (fresh descriptor, structural equality)
    // ---------------------------------------------------------------------

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.fresh(TypeKind::Pointer { pointee }, 8, 8)
    }

    pub fn array_of(&mut self, element: TypeId, len: u32) -> TypeId {
        let elem = self.get(element);
        let (size, align) = (elem.size * len, elem.align);
        self.fresh(TypeKind::Array { element, len }, size, align)
    }

    pub fn function_of(&mut self, params: Vec<TypeId>, ret: Option<TypeId>) -> TypeId {
        let ret = ret.unwrap_or_else(|| self.void());
        self.fresh(TypeKind::Function { params, ret }, 8, 8)
    }

    pub fn struct_of(&mut self, name: &str, fields: Vec<(String, TypeId)>) -> TypeId {
        let (size, align) = self.layout_fields(&fields);
        self.fresh(
            TypeKind::Struct {
                name: name.to_string(),
                fields,
            },
            size,
            align,
        )
    }

    pub fn class_of(&mut self, name: &str, fields: Vec<(String, TypeId)>) -> TypeId {
        let (size, align) = self.layout_fields(&fields);
        self.fresh(
            TypeKind::Class {
                name: name.to_string(),
                fields,
            },
            size,
            align,
        )
    }

    fn layout_fields(&self, fields: &[(String, TypeId)]) -> (u32, u32) {
        let mut size = 0u32;
        let mut align = 1u32;
        for (_, ty) in fields {
            let desc = self.get(*ty);
            let field_align = desc.align.max(1);
            size = size.next_multiple_of(field_align) + desc.size;
            align = align.max(field_align);
        }
        (size.next_multiple_of(align), align)
    }

    // ---------------------------------------------------------------------
    // Predicates
    // ---------------------------------------------------------------------

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(
            self.get(id).kind,
            TypeKind::Int8
                | TypeKind::Int16
                | TypeKind::Int32
                | TypeKind::Int64
                | TypeKind::Uint8
                | TypeKind::Uint16
                | TypeKind::Uint32
                | TypeKind::Uint64
        )
    }

    pub fn is_unsigned(&self, id: TypeId) -> bool {
        matches!(
            self.get(id).kind,
            TypeKind::Uint8 | TypeKind::Uint16 | TypeKind::Uint32 | TypeKind::Uint64
        )
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Float32 | TypeKind::Float64)
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_float(id)
    }

    /// Strings count as pointer-like for cast purposes.
    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Pointer { .. } | TypeKind::Str)
    }

    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id).kind {
            TypeKind::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    // ---------------------------------------------------------------------
    // Equality & conversion
    // ---------------------------------------------------------------------

    /// Deep structural equality.
    pub fn equal(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (&self.get(a).kind, &self.get(b).kind) {
            (TypeKind::Pointer { pointee: pa }, TypeKind::Pointer { pointee: pb }) => {
                self.equal(*pa, *pb)
            }
            (
                TypeKind::Array {
                    element: ea,
                    len: la,
                },
                TypeKind::Array {
                    element: eb,
                    len: lb,
                },
            ) => la == lb && self.equal(*ea, *eb),
            (
                TypeKind::Function {
                    params: pa,
                    ret: ra,
                },
                TypeKind::Function {
                    params: pb,
                    ret: rb,
                },
            ) => {
                pa.len() == pb.len()
                    && self.equal(*ra, *rb)
                    && pa.iter().zip(pb).all(|(x, y)| self.equal(*x, *y))
            }
            (TypeKind::Struct { name: na, .. }, TypeKind::Struct { name: nb, .. })
            | (TypeKind::Class { name: na, .. }, TypeKind::Class { name: nb, .. }) => na == nb,
            (ka, kb) => std::mem::discriminant(ka) == std::mem::discriminant(kb),
        }
    }

    /// A `src` value may be assigned to a `dst` slot without a cast.
    pub fn assignable(&self, src: TypeId, dst: TypeId) -> bool {
        if self.equal(src, dst) {
            return true;
        }
        if matches!(self.get(dst).kind, TypeKind::Any) {
            return true;
        }
        if self.is_numeric(src) && self.is_numeric(dst) {
            return true;
        }
        self.is_pointer(src) && self.is_pointer(dst)
    }

    /// Castability extends assignability with integer<->pointer.
    pub fn castable(&self, src: TypeId, dst: TypeId) -> bool {
        if self.assignable(src, dst) {
            return true;
        }
        (self.is_pointer(src) && self.is_integer(dst))
            || (self.is_integer(src) && self.is_pointer(dst))
    }

    // ---------------------------------------------------------------------
    // Promotion & result rules
    // ---------------------------------------------------------------------

    /// Integers narrower than 32 bits widen to int32/uint32.
    pub fn promote(&mut self, id: TypeId) -> TypeId {
        if self.is_integer(id) && self.get(id).size < 4 {
            if self.is_unsigned(id) {
                self.uint32()
            } else {
                self.int32()
            }
        } else {
            id
        }
    }

    /// Result type of a binary instruction.
    pub fn binary_result(&mut self, lhs: TypeId, rhs: TypeId, op: Opcode) -> TypeId {
        if op.is_comparison() || matches!(op, Opcode::LogicalAnd | Opcode::LogicalOr) {
            return self.bool();
        }
        if !self.is_numeric(lhs) || !self.is_numeric(rhs) {
            return self.unknown();
        }
        let lhs = self.promote(lhs);
        let rhs = self.promote(rhs);
        let has_f64 = matches!(self.get(lhs).kind, TypeKind::Float64)
            || matches!(self.get(rhs).kind, TypeKind::Float64);
        if has_f64 {
            return self.float64();
        }
        let has_f32 = matches!(self.get(lhs).kind, TypeKind::Float32)
            || matches!(self.get(rhs).kind, TypeKind::Float32);
        if has_f32 {
            return self.float32();
        }
        // Integer vs integer: larger byte size wins, ties go left.
        if self.get(lhs).size >= self.get(rhs).size {
            lhs
        } else {
            rhs
        }
    }

    /// Common type of two operands; `any` when they are unrelated.
    pub fn common(&mut self, a: TypeId, b: TypeId) -> TypeId {
        if self.equal(a, b) {
            return a;
        }
        if self.is_numeric(a) && self.is_numeric(b) {
            if self.is_float(a) || self.is_float(b) {
                let f64_wins = matches!(self.get(a).kind, TypeKind::Float64)
                    || matches!(self.get(b).kind, TypeKind::Float64);
                return if f64_wins { self.float64() } else { self.float32() };
            }
            // Wider integer wins; on equal width the unsigned variant
            // wins, which keeps common() symmetric in its arguments.
            return if self.get(a).size > self.get(b).size {
                a
            } else if self.get(b).size > self.get(a).size {
                b
            } else if self.is_unsigned(a) {
                a
            } else if self.is_unsigned(b) {
                b
            } else {
                a
            };
        }
        self.any()
    }

    pub fn supports_op(&self, id: TypeId, op: Opcode) -> bool {
        match op {
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                self.is_numeric(id)
            }
            Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor | Opcode::Shl | Opcode::Shr => {
                self.is_integer(id)
            }
            Opcode::Lt | Opcode::Gt | Opcode::Le | Opcode::Ge => self.is_numeric(id),
            Opcode::Eq | Opcode::Ne => true,
            _ => true,
        }
    }

    /// Zero immediate for a type.
    pub fn default_value(&self, id: TypeId) -> crate::module::Value {
        match self.get(id).kind {
            TypeKind::Float32 | TypeKind::Float64 => crate::module::Value::ImmFloat(0.0),
            _ => crate::module::Value::ImmInt(0),
        }
    }

    pub fn display(&self, id: TypeId) -> String {
        match &self.get(id).kind {
            TypeKind::Void => "void".into(),
            TypeKind::Int8 => "int8".into(),
            TypeKind::Int16 => "int16".into(),
            TypeKind::Int32 => "int32".into(),
            TypeKind::Int64 => "int64".into(),
            TypeKind::Uint8 => "uint8".into(),
            TypeKind::Uint16 => "uint16".into(),
            TypeKind::Uint32 => "uint32".into(),
            TypeKind::Uint64 => "uint64".into(),
            TypeKind::Float32 => "float32".into(),
            TypeKind::Float64 => "float64".into(),
            TypeKind::Bool => "bool".into(),
            TypeKind::Char => "char".into(),
            TypeKind::Str => "string".into(),
            TypeKind::Pointer { pointee } => format!("{}*", self.display(*pointee)),
            TypeKind::Array { element, len } => format!("{}[{}]", self.display(*element), len),
            TypeKind::Function { .. } => "function".into(),
            TypeKind::Struct { name, .. } | TypeKind::Class { name, .. } => name.clone(),
            TypeKind::Any => "any".into(),
            TypeKind::Unknown => "unknown".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_canonical() {
        let mut pool = TypePool::new();
        assert_eq!(pool.int32(), pool.int32());
        assert_eq!(pool.float64(), pool.float64());
    }

    #[test]
    fn derived_types_compare_structurally() {
        let mut pool = TypePool::new();
        let i32t = pool.int32();
        let p1 = pool.pointer_to(i32t);
        let p2 = pool.pointer_to(i32t);
        assert_ne!(p1, p2);
        assert!(pool.equal(p1, p2));

        let a1 = pool.array_of(i32t, 4);
        let a2 = pool.array_of(i32t, 8);
        assert!(!pool.equal(a1, a2));
    }

    #[test]
    fn promotion_widens_narrow_integers() {
        let mut pool = TypePool::new();
        let i16t = pool.int16();
        let u8t = pool.uint8();
        let i64t = pool.int64();
        assert_eq!(pool.promote(i16t), pool.int32());
        assert_eq!(pool.promote(u8t), pool.uint32());
        assert_eq!(pool.promote(i64t), i64t);
    }

    #[test]
    fn common_matches_spec_scenarios() {
        let mut pool = TypePool::new();
        let i16t = pool.int16();
        let i32t = pool.int32();
        let f32t = pool.float32();
        let f64t = pool.float64();
        let any = pool.any();

        assert_eq!(pool.common(i16t, i32t), i32t);
        assert_eq!(pool.common(i32t, f32t), f32t);
        assert_eq!(pool.common(f32t, f64t), f64t);
        assert_eq!(pool.common(i32t, any), any);
    }

    #[test]
    fn common_is_symmetric_for_numerics() {
        let mut pool = TypePool::new();
        let numerics = [
            pool.int8(),
            pool.int16(),
            pool.int32(),
            pool.int64(),
            pool.uint8(),
            pool.uint16(),
            pool.uint32(),
            pool.uint64(),
            pool.float32(),
            pool.float64(),
        ];
        for &a in &numerics {
            for &b in &numerics {
                assert_eq!(pool.common(a, b), pool.common(b, a));
            }
        }
        // Equal width resolves to the unsigned variant.
        let (i32t, u32t) = (pool.int32(), pool.uint32());
        assert_eq!(pool.common(i32t, u32t), u32t);
    }

    #[test]
    fn binary_result_rules() {
        let mut pool = TypePool::new();
        let i16t = pool.int16();
        let i32t = pool.int32();
        let f32t = pool.float32();
        let string = pool.string();

        assert_eq!(pool.binary_result(i32t, i32t, Opcode::Lt), pool.bool());
        assert_eq!(
            pool.binary_result(i32t, i32t, Opcode::LogicalAnd),
            pool.bool()
        );
        assert_eq!(pool.binary_result(i16t, i32t, Opcode::Add), i32t);
        assert_eq!(pool.binary_result(i32t, f32t, Opcode::Mul), f32t);
        assert_eq!(
            pool.binary_result(string, i32t, Opcode::Add),
            pool.unknown()
        );
    }

    #[test]
    fn cast_rules_extend_assignability() {
        let mut pool = TypePool::new();
        let i32t = pool.int32();
        let i64t = pool.int64();
        let ptr = pool.pointer_to(i32t);
        let any = pool.any();

        assert!(pool.assignable(i32t, any));
        assert!(pool.assignable(i32t, i64t));
        assert!(!pool.assignable(ptr, i64t));
        assert!(pool.castable(ptr, i64t));
        assert!(pool.castable(i64t, ptr));
    }
}
