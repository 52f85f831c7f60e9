//! Record trait and the erased type registry.
//!
//! Clients describe each stored type once by implementing [`Record`]. The
//! database erases the implementation into a small table of monomorphized
//! function pointers so that the rewrite engine and the WAL can stream every
//! registered type without knowing any of them statically. The table is
//! ordered: a type's position is its `type_index`, which is what the file
//! format and the WAL persist.

use crate::error::{CoreResult, Error};
use crate::types::RecordId;
use std::any::Any;
use tqdb_codec::{CodecResult, Reader, Writer};

/// Maximum number of record types per database instance.
pub const MAX_RECORD_TYPES: usize = 8;

/// Default per-type sanity cap on record counts.
pub const DEFAULT_MAX_COUNT: u32 = 1 << 20;

/// A boxed record of some registered type.
pub(crate) type BoxedRecord = Box<dyn Any + Send>;

/// A stored record type.
///
/// Implementations declare the type's unique name, its binary layout via
/// [`encode`](Record::encode)/[`decode`](Record::decode), and access to the
/// embedded id. [`skip`](Record::skip) has a default that decodes and
/// discards; override it when the layout allows advancing without
/// materializing the record (fixed-size records, length-prefixed blobs).
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct Item {
///     id: RecordId,
///     name: String,
///     value: i32,
/// }
///
/// impl Record for Item {
///     fn type_name() -> &'static str {
///         "Item"
///     }
///
///     fn encode(&self, w: &mut Writer<'_>) -> CodecResult<()> {
///         w.write_u32(self.id.as_u32())?;
///         w.write_str(&self.name)?;
///         w.write_i32(self.value)
///     }
///
///     fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
///         Ok(Self {
///             id: RecordId::new(r.read_u32()?),
///             name: r.read_str()?,
///             value: r.read_i32()?,
///         })
///     }
///
///     fn id(&self) -> RecordId {
///         self.id
///     }
///
///     fn set_id(&mut self, id: RecordId) {
///         self.id = id;
///     }
/// }
/// ```
pub trait Record: Clone + Send + 'static {
    /// Unique name of this record type.
    fn type_name() -> &'static str;

    /// Sanity cap on the number of records of this type. A count read from
    /// the main file above this value is treated as zero.
    fn max_count() -> u32 {
        DEFAULT_MAX_COUNT
    }

    /// Serializes the record.
    fn encode(&self, w: &mut Writer<'_>) -> CodecResult<()>;

    /// Deserializes one record.
    fn decode(r: &mut Reader<'_>) -> CodecResult<Self>;

    /// Returns the record's id.
    fn id(&self) -> RecordId;

    /// Stores the id inside the record. Called by `add` with the allocated
    /// id.
    fn set_id(&mut self, id: RecordId);

    /// Advances the reader past one serialized record.
    fn skip(r: &mut Reader<'_>) -> CodecResult<()> {
        Self::decode(r).map(|_| ())
    }
}

/// Type-erased operations over one registered record type.
pub(crate) struct TypeVTable {
    pub decode: fn(&mut Reader<'_>) -> CodecResult<BoxedRecord>,
    pub encode: fn(&mut Writer<'_>, &(dyn Any + Send)) -> CoreResult<()>,
    pub skip: fn(&mut Reader<'_>) -> CodecResult<()>,
    pub id_of: fn(&(dyn Any + Send)) -> CoreResult<RecordId>,
}

fn erased_decode<T: Record>(r: &mut Reader<'_>) -> CodecResult<BoxedRecord> {
    Ok(Box::new(T::decode(r)?))
}

fn erased_encode<T: Record>(
    w: &mut Writer<'_>,
    record: &(dyn Any + Send),
) -> CoreResult<()> {
    let record = downcast::<T>(record)?;
    record.encode(w)?;
    Ok(())
}

fn erased_id<T: Record>(record: &(dyn Any + Send)) -> CoreResult<RecordId> {
    Ok(downcast::<T>(record)?.id())
}

fn downcast<T: Record>(record: &(dyn Any + Send)) -> CoreResult<&T> {
    record.downcast_ref::<T>().ok_or_else(|| {
        Error::invalid_argument(format!(
            "record is not of type {}",
            T::type_name()
        ))
    })
}

/// One registered type: name, cap, next auto-id, erased operations.
pub(crate) struct TypeEntry {
    pub name: &'static str,
    pub max_count: u32,
    pub next_id: u32,
    pub vtable: TypeVTable,
}

/// The ordered registration table. Position is `type_index`.
pub(crate) struct TypeTable {
    entries: Vec<TypeEntry>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> &TypeEntry {
        &self.entries[index]
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut TypeEntry {
        &mut self.entries[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Resolves a registered type's index or fails with `NotRegistered`.
    pub fn require(&self, name: &str) -> CoreResult<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::not_registered(name))
    }

    /// Appends a new type at the next index.
    pub fn insert<T: Record>(&mut self) -> CoreResult<usize> {
        let name = T::type_name();
        if name.is_empty() {
            return Err(Error::invalid_argument("record type name is empty"));
        }
        if self.index_of(name).is_some() {
            return Err(Error::exists(format!(
                "record type {name} is already registered"
            )));
        }
        if self.entries.len() >= MAX_RECORD_TYPES {
            return Err(Error::full(format!(
                "type table holds at most {MAX_RECORD_TYPES} record types"
            )));
        }

        let index = self.entries.len();
        self.entries.push(TypeEntry {
            name,
            max_count: T::max_count(),
            next_id: 1,
            vtable: TypeVTable {
                decode: erased_decode::<T>,
                encode: erased_encode::<T>,
                skip: erased_skip::<T>,
                id_of: erased_id::<T>,
            },
        });
        Ok(index)
    }
}

fn erased_skip<T: Record>(r: &mut Reader<'_>) -> CodecResult<()> {
    T::skip(r)
}
