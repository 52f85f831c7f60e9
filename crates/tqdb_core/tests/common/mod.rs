//! Shared fixtures for integration tests.

#![allow(dead_code)]

use tqdb_core::{
    CodecResult, Config, Database, FieldDef, FieldValue, Queryable, Reader, Record,
    RecordId, Writer,
};

/// A small record with a variable-length name, used by most tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: RecordId,
    pub name: String,
    pub value: i32,
    pub active: bool,
}

impl Item {
    pub fn new(name: &str, value: i32) -> Self {
        Self {
            id: RecordId::UNASSIGNED,
            name: name.to_owned(),
            value,
            active: true,
        }
    }
}

impl Record for Item {
    fn type_name() -> &'static str {
        "Item"
    }

    fn encode(&self, w: &mut Writer<'_>) -> CodecResult<()> {
        w.write_u32(self.id.as_u32())?;
        w.write_str(&self.name)?;
        w.write_i32(self.value)?;
        w.write_bool(self.active)
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(Self {
            id: RecordId::new(r.read_u32()?),
            name: r.read_str()?,
            value: r.read_i32()?,
            active: r.read_bool()?,
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn skip(r: &mut Reader<'_>) -> CodecResult<()> {
        r.skip(4)?;
        r.skip_str()?;
        r.skip(5)
    }
}

/// The product catalog entity from the query tests, with one field of every
/// queryable kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: RecordId,
    pub name: String,
    pub category: String,
    pub price: i32,
    pub quantity: i32,
    pub rating: f32,
    pub active: bool,
    pub priority: u8,
}

impl Product {
    pub fn new(
        name: &str,
        category: &str,
        price: i32,
        quantity: i32,
        rating: f32,
        active: bool,
        priority: u8,
    ) -> Self {
        Self {
            id: RecordId::UNASSIGNED,
            name: name.to_owned(),
            category: category.to_owned(),
            price,
            quantity,
            rating,
            active,
            priority,
        }
    }
}

impl Record for Product {
    fn type_name() -> &'static str {
        "Product"
    }

    fn encode(&self, w: &mut Writer<'_>) -> CodecResult<()> {
        w.write_u32(self.id.as_u32())?;
        w.write_str(&self.name)?;
        w.write_str(&self.category)?;
        w.write_i32(self.price)?;
        w.write_i32(self.quantity)?;
        w.write_f32(self.rating)?;
        w.write_bool(self.active)?;
        w.write_u8(self.priority)
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(Self {
            id: RecordId::new(r.read_u32()?),
            name: r.read_str()?,
            category: r.read_str()?,
            price: r.read_i32()?,
            quantity: r.read_i32()?,
            rating: r.read_f32()?,
            active: r.read_bool()?,
            priority: r.read_u8()?,
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn skip(r: &mut Reader<'_>) -> CodecResult<()> {
        r.skip(4)?;
        r.skip_str()?;
        r.skip_str()?;
        r.skip(14)
    }
}

impl Queryable for Product {
    fn fields() -> &'static [FieldDef<Self>] {
        &[
            FieldDef {
                name: "id",
                get: |p| FieldValue::U32(p.id.as_u32()),
            },
            FieldDef {
                name: "name",
                get: |p| FieldValue::Str(&p.name),
            },
            FieldDef {
                name: "category",
                get: |p| FieldValue::Str(&p.category),
            },
            FieldDef {
                name: "price",
                get: |p| FieldValue::I32(p.price),
            },
            FieldDef {
                name: "quantity",
                get: |p| FieldValue::I32(p.quantity),
            },
            FieldDef {
                name: "rating",
                get: |p| FieldValue::F32(p.rating),
            },
            FieldDef {
                name: "active",
                get: |p| FieldValue::Bool(p.active),
            },
            FieldDef {
                name: "priority",
                get: |p| FieldValue::U8(p.priority),
            },
        ]
    }
}

/// The fixed ten-product catalog; ids are assigned 1..=10 in this order.
pub fn product_catalog() -> Vec<Product> {
    vec![
        Product::new("Apple iPhone 15", "Electronics", 99900, 50, 4.8, true, 1),
        Product::new("Samsung Galaxy", "Electronics", 89900, 30, 4.5, true, 2),
        Product::new("Sony Headphones", "Electronics", 29900, 100, 4.2, true, 3),
        Product::new("Coffee Maker", "Appliances", 4999, 200, 4.0, true, 5),
        Product::new("Toaster", "Appliances", 2999, 150, 3.8, true, 6),
        Product::new("Old Laptop", "Electronics", 19900, 0, 3.0, false, 10),
        Product::new("Vintage Radio", "Electronics", 5000, 5, 4.9, false, 8),
        Product::new("Blender Pro", "Appliances", 7999, 75, 4.3, true, 4),
        Product::new("Test Item Alpha", "Test", 100, 10, 5.0, true, 1),
        Product::new("Test Item Beta", "Test", 200, 20, 4.5, false, 2),
    ]
}

/// Opens a database without WAL or cache at `dir/<name>`.
pub fn open_plain(dir: &tempfile::TempDir, name: &str) -> Database {
    Database::open(Config::new(dir.path().join(name)).enable_wal(false)).unwrap()
}

/// Opens a database with the WAL enabled at `dir/<name>`.
pub fn open_with_wal(dir: &tempfile::TempDir, name: &str) -> Database {
    Database::open(Config::new(dir.path().join(name))).unwrap()
}

/// Collects every visible record of a type in iteration order.
pub fn collect_all<T: Record>(db: &Database) -> Vec<T> {
    let mut out = Vec::new();
    db.for_each::<T, _>(|rec| {
        out.push(rec.clone());
        true
    })
    .unwrap();
    out
}
