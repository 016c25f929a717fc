//! # Data Bags
//!
//! A [`DataBag`] is the runtime scope of a network call: the argument tuple
//! and the sub-networks visible at this point of the program.
//!
//! ```text
//!   slots: [ outer_0, outer_1 | arg_0, arg_1 ]
//!   nets:  [ self | helper    | arg_net ]
//!                 ^
//!                 DataPointer { data: 2, nets: 2 }
//! ```
//!
//! A [`DataPointer`] is a scope boundary. Everything before it belongs to
//! the enclosing scope, everything from it on is local. A callee declares
//! the pointer it was defined at; [`DataBag::next_scope`] keeps the caller's
//! prefix up to that pointer and appends the new arguments, which gives
//! lexical visibility without an environment chain.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use structnet_tree::{make_tuple, TensorTree};

use crate::error::RuntimeError;
use crate::network::NetRef;

/// Offsets into a bag's data slots and nets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataPointer {
    pub data: usize,
    pub nets: usize,
}

impl DataPointer {
    /// No enclosing scope is visible.
    pub const START: DataPointer = DataPointer { data: 0, nets: 0 };

    pub fn new(data: usize, nets: usize) -> Self {
        Self { data, nets }
    }

    /// The same boundary with one more net in the enclosing scope: the
    /// self reference a recursive layer puts at net slot 0.
    pub fn with_self_slot(self) -> Self {
        Self {
            data: self.data,
            nets: self.nets + 1,
        }
    }
}

/// Argument tuple and visible networks of one call.
#[derive(Debug, Clone)]
pub struct DataBag {
    data: Arc<TensorTree>,
    nets: Vec<NetRef>,
    size: usize,
}

impl DataBag {
    /// A bag whose size is the row count of `data`.
    pub fn new(data: impl Into<Arc<TensorTree>>, nets: Vec<NetRef>) -> Self {
        let data = data.into();
        let size = data.rows();
        Self { data, nets, size }
    }

    /// A bag with an explicit batch size. The size must match the rows of
    /// `data` unless `data` has no slots.
    pub fn with_size(
        data: impl Into<Arc<TensorTree>>,
        nets: Vec<NetRef>,
        size: usize,
    ) -> Result<Self, RuntimeError> {
        let data = data.into();
        if data.width() > 0 && data.rows() != size {
            return Err(RuntimeError::SizeMismatch {
                expected: size,
                got: data.rows(),
            });
        }
        Ok(Self { data, nets, size })
    }

    /// A bag with no slots, no nets and no rows.
    pub fn empty() -> Self {
        Self {
            data: Arc::new(TensorTree::empty()),
            nets: Vec::new(),
            size: 0,
        }
    }

    /// Build a bag from individual argument trees.
    pub fn from_slots(
        slots: Vec<Arc<TensorTree>>,
        nets: Vec<NetRef>,
        size: usize,
    ) -> Result<Self, RuntimeError> {
        Self::with_size(make_tuple(slots)?, nets, size)
    }

    pub fn data(&self) -> &Arc<TensorTree> {
        &self.data
    }

    pub fn nets(&self) -> &[NetRef] {
        &self.nets
    }

    /// Batch size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The argument slots: the Prod children of the data tuple.
    pub fn slots(&self) -> Result<&[Option<Arc<TensorTree>>], RuntimeError> {
        if self.data.width() == 0 {
            return Ok(&[]);
        }
        self.data.tuple_operands().ok_or(RuntimeError::NotATuple)
    }

    /// Tree in data slot `index`.
    pub fn get_tree(&self, index: usize) -> Result<Arc<TensorTree>, RuntimeError> {
        let slots = self.slots()?;
        match slots.get(index) {
            None => Err(RuntimeError::SlotOutOfRange {
                index,
                len: slots.len(),
            }),
            Some(None) => Err(RuntimeError::AbsentSlot { index }),
            Some(Some(tree)) => Ok(tree.clone()),
        }
    }

    /// Network in net slot `index`.
    pub fn get_net(&self, index: usize) -> Result<NetRef, RuntimeError> {
        self.nets
            .get(index)
            .cloned()
            .ok_or(RuntimeError::SlotOutOfRange {
                index,
                len: self.nets.len(),
            })
    }

    fn check(&self, pointer: DataPointer) -> Result<usize, RuntimeError> {
        let slots = self.slots()?.len();
        if pointer.data > slots || pointer.nets > self.nets.len() {
            return Err(RuntimeError::PointerOutOfRange {
                pointer,
                slots,
                nets: self.nets.len(),
            });
        }
        Ok(slots)
    }

    fn from_slot_range(&self, slots: &[Option<Arc<TensorTree>>], offset: usize, nets: &[NetRef]) -> Result<DataBag, RuntimeError> {
        let trees = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.clone()
                    .ok_or(RuntimeError::AbsentSlot { index: offset + i })
            })
            .collect::<Result<Vec<_>, _>>()?;
        DataBag::from_slots(trees, nets.to_vec(), self.size)
    }

    /// The enclosing scope: slots and nets before `pointer`.
    pub fn before(&self, pointer: DataPointer) -> Result<DataBag, RuntimeError> {
        self.check(pointer)?;
        let slots = self.slots()?;
        self.from_slot_range(&slots[..pointer.data], 0, &self.nets[..pointer.nets])
    }

    /// The local scope: slots and nets from `pointer` on.
    pub fn after(&self, pointer: DataPointer) -> Result<DataBag, RuntimeError> {
        self.check(pointer)?;
        let slots = self.slots()?;
        self.from_slot_range(&slots[pointer.data..], pointer.data, &self.nets[pointer.nets..])
    }

    /// [`before`](Self::before) and [`after`](Self::after) together.
    pub fn split(&self, pointer: DataPointer) -> Result<(DataBag, DataBag), RuntimeError> {
        Ok((self.before(pointer)?, self.after(pointer)?))
    }

    /// Concatenate slots and nets of two bags of the same batch size.
    pub fn append(&self, other: &DataBag) -> Result<DataBag, RuntimeError> {
        if self.size != other.size {
            return Err(RuntimeError::SizeMismatch {
                expected: self.size,
                got: other.size,
            });
        }
        let mut trees = Vec::new();
        for (offset, bag) in [(0, self), (self.slots()?.len(), other)] {
            for (i, slot) in bag.slots()?.iter().enumerate() {
                trees.push(
                    slot.clone()
                        .ok_or(RuntimeError::AbsentSlot { index: offset + i })?,
                );
            }
        }
        let nets = self.nets.iter().chain(other.nets.iter()).cloned().collect();
        DataBag::from_slots(trees, nets, self.size)
    }

    /// Scope for a callee declared at `pointer`: this bag's prefix up to
    /// the pointer followed by `args`.
    pub fn next_scope(&self, pointer: DataPointer, args: &DataBag) -> Result<DataBag, RuntimeError> {
        self.before(pointer)?.append(args)
    }

    /// Keep the rows where `mask` is true.
    pub fn select_rows(&self, mask: &[bool]) -> Result<DataBag, RuntimeError> {
        if mask.len() != self.size {
            return Err(RuntimeError::SizeMismatch {
                expected: self.size,
                got: mask.len(),
            });
        }
        let size = mask.iter().filter(|&&m| m).count();
        let data = if self.data.width() == 0 {
            self.data.clone()
        } else {
            Arc::new(self.data.select_rows(mask)?)
        };
        Ok(DataBag {
            data,
            nets: self.nets.clone(),
            size,
        })
    }

    /// The same bag with `net` prepended at net slot 0.
    pub fn with_self_reference(&self, net: NetRef) -> DataBag {
        let mut nets = Vec::with_capacity(self.nets.len() + 1);
        nets.push(net);
        nets.extend(self.nets.iter().cloned());
        DataBag {
            data: self.data.clone(),
            nets,
            size: self.size,
        }
    }
}
