//! Canonical persistence interface and the sled-backed store
//!
//! The core owns the rules, not the bytes: every backend adapts to the
//! [`Store`] trait's shape (one document per entity, merge-style partial
//! updates that refresh `updated_at`, timestamp ordering preserved). The
//! shipped backend keeps one sled tree per collection with
//! minicbor-encoded values.
use crate::codes::PaymentCode;
use crate::error::{Error, Result};
use crate::menu::{self, MenuItem};
use crate::order::{Order, OrderPatch, TimeStamp};
use crate::settings::{Settings, SettingsPatch};
use crate::student::{Pid, Student, StudentPatch};
use sled::Batch;
use std::sync::Arc;

const ORDERS_TREE: &str = "orders";
const STUDENTS_TREE: &str = "students";
const MENU_TREE: &str = "menu";
const SETTINGS_TREE: &str = "settings";

/// The settings collection holds a single document under this key.
pub const SETTINGS_KEY: &str = "main";

pub trait Store {
    fn create_order(&self, order: &Order) -> Result<Order>;
    fn order_by_id(&self, id: &str) -> Result<Option<Order>>;
    /// Exact match on the stored code. If backend inconsistency ever
    /// produced duplicates, the earliest-created match wins; an empty code
    /// matches nothing.
    fn order_by_payment_code(&self, code: &PaymentCode) -> Result<Option<Order>>;
    /// All orders for one student, newest first.
    fn orders_for_student(&self, pid: &Pid) -> Result<Vec<Order>>;
    /// Every order in the store, newest first.
    fn list_orders(&self) -> Result<Vec<Order>>;
    /// Merge the patch into the stored document and refresh `updated_at`.
    fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order>;
    fn student(&self, pid: &Pid) -> Result<Option<Student>>;
    /// Merge the patch into the student document, creating the record with
    /// defaults first if it does not exist yet.
    fn upsert_student(&self, pid: &Pid, patch: StudentPatch) -> Result<Student>;
    /// Never fails on a fresh store: falls back to defaults when the
    /// settings document has not been written yet.
    fn settings(&self) -> Result<Settings>;
    fn update_settings(&self, patch: SettingsPatch) -> Result<Settings>;
    fn list_menu(&self) -> Result<Vec<MenuItem>>;
    fn menu_item(&self, id: &str) -> Result<Option<MenuItem>>;
    fn upsert_menu_item(&self, item: MenuItem) -> Result<MenuItem>;
    fn set_menu_available(&self, id: &str, available: bool) -> Result<MenuItem>;
    fn delete_menu_item(&self, id: &str) -> Result<()>;
}

pub struct SledStore {
    db: Arc<sled::Db>,
    orders: sled::Tree,
    students: sled::Tree,
    menu: sled::Tree,
    settings: sled::Tree,
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T> {
    Ok(minicbor::decode(bytes)?)
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

impl SledStore {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            orders: db.open_tree(ORDERS_TREE)?,
            students: db.open_tree(STUDENTS_TREE)?,
            menu: db.open_tree(MENU_TREE)?,
            settings: db.open_tree(SETTINGS_TREE)?,
            db,
        })
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::new(Arc::new(db))
    }

    /// First-run seeding: write the default settings document and the
    /// default menu, once. Idempotent; a second call sees the settings
    /// document and does nothing.
    pub fn ensure_init(&self) -> Result<()> {
        if self.settings.get(SETTINGS_KEY)?.is_some() {
            return Ok(());
        }

        self.settings
            .insert(SETTINGS_KEY, encode(&Settings::new())?)?;

        let mut batch = Batch::default();
        for item in menu::default_menu()? {
            batch.insert(item.id.as_bytes(), encode(&item)?);
        }
        self.menu.apply_batch(batch)?;

        Ok(())
    }

    /// Erase everything and re-seed defaults.
    pub fn factory_reset(&self) -> Result<()> {
        self.orders.clear()?;
        self.students.clear()?;
        self.menu.clear()?;
        self.settings.clear()?;
        self.ensure_init()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn scan_orders(&self) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        for entry in self.orders.iter() {
            let (_, value) = entry?;
            orders.push(decode::<Order>(value.as_ref())?);
        }
        Ok(orders)
    }
}

impl Store for SledStore {
    fn create_order(&self, order: &Order) -> Result<Order> {
        self.orders.insert(order.id.as_bytes(), encode(order)?)?;
        Ok(order.clone())
    }

    fn order_by_id(&self, id: &str) -> Result<Option<Order>> {
        match self.orders.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    fn order_by_payment_code(&self, code: &PaymentCode) -> Result<Option<Order>> {
        if code.is_empty() {
            return Ok(None);
        }
        Ok(self
            .scan_orders()?
            .into_iter()
            .filter(|o| o.payment_code.as_ref() == Some(code))
            .min_by(|a, b| a.created_at.cmp(&b.created_at)))
    }

    fn orders_for_student(&self, pid: &Pid) -> Result<Vec<Order>> {
        let orders = self
            .scan_orders()?
            .into_iter()
            .filter(|o| &o.pid == pid)
            .collect();
        Ok(newest_first(orders))
    }

    fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(newest_first(self.scan_orders()?))
    }

    fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
        let mut order = self.order_by_id(id)?.ok_or_else(|| Error::NotFound {
            kind: "order",
            id: id.to_string(),
        })?;

        patch.apply(&mut order);
        order.updated_at = TimeStamp::new();
        self.orders.insert(order.id.as_bytes(), encode(&order)?)?;

        Ok(order)
    }

    fn student(&self, pid: &Pid) -> Result<Option<Student>> {
        match self.students.get(pid.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    fn upsert_student(&self, pid: &Pid, patch: StudentPatch) -> Result<Student> {
        let mut student = self
            .student(pid)?
            .unwrap_or_else(|| Student::new(pid.clone()));

        patch.apply(&mut student);
        student.updated_at = TimeStamp::new();
        self.students
            .insert(pid.as_str().as_bytes(), encode(&student)?)?;

        Ok(student)
    }

    fn settings(&self) -> Result<Settings> {
        match self.settings.get(SETTINGS_KEY)? {
            Some(bytes) => Ok(decode(bytes.as_ref())?),
            None => Ok(Settings::new()),
        }
    }

    fn update_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut settings = self.settings()?;

        patch.apply(&mut settings);
        settings.updated_at = TimeStamp::new();
        self.settings.insert(SETTINGS_KEY, encode(&settings)?)?;

        Ok(settings)
    }

    fn list_menu(&self) -> Result<Vec<MenuItem>> {
        let mut items = Vec::new();
        for entry in self.menu.iter() {
            let (_, value) = entry?;
            items.push(decode::<MenuItem>(value.as_ref())?);
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    fn menu_item(&self, id: &str) -> Result<Option<MenuItem>> {
        match self.menu.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    fn upsert_menu_item(&self, mut item: MenuItem) -> Result<MenuItem> {
        item.updated_at = TimeStamp::new();
        self.menu.insert(item.id.as_bytes(), encode(&item)?)?;
        Ok(item)
    }

    fn set_menu_available(&self, id: &str, available: bool) -> Result<MenuItem> {
        let mut item = self.menu_item(id)?.ok_or_else(|| Error::NotFound {
            kind: "menu item",
            id: id.to_string(),
        })?;

        item.available = available;
        item.updated_at = TimeStamp::new();
        self.menu.insert(item.id.as_bytes(), encode(&item)?)?;

        Ok(item)
    }

    fn delete_menu_item(&self, id: &str) -> Result<()> {
        self.menu.remove(id.as_bytes())?;
        Ok(())
    }
}
