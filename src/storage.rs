//!
//! petshop storage module
//! ----------------------
//! This module implements the on-disk document store backing the API. Each
//! collection is a directory under the configured root (`pets/`, `users/`)
//! and each document is a single JSON file named `<id>.json`. Writes go
//! through a temp file followed by a rename so a single-document update is
//! atomic on the filesystem.
//!
//! Key responsibilities:
//! - Pet and user document types shared across the API surface.
//! - Get-by-id, create, update, delete and list per collection.
//! - Partial pet updates that never touch the id or the owner id.
//!
//! The public API centers around the `Store` type, which is wrapped in a
//! thread-safe `SharedStore` (`Arc<Mutex<Store>>`) elsewhere in the codebase.

use std::sync::Arc;
use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::identity::Role;

const PETS: &str = "pets";
const USERS: &str = "users";

/// A pet document as stored in the `pets` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pet {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Private pets are visible only to their owner and admins.
    #[serde(default)]
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user document as stored in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields a pet update may change. The id and the owner id are never touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PetUpdate {
    pub name: Option<String>,
    pub species: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub private: Option<bool>,
}

/// Core on-disk storage handle for the petshop document tree.
#[derive(Clone)]
pub struct Store {
    /// Root folder for all collections.
    root: PathBuf,
}

/// Thread-safe handle shared by all request handlers.
#[derive(Clone)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Store::new(root)?))))
    }
}

impl Store {
    /// Create a new Store rooted at the given filesystem path.
    /// The collection directories are created if they do not already exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for collection in [PETS, USERS] {
            fs::create_dir_all(root.join(collection))
                .with_context(|| format!("creating collection directory under {}", root.display()))?;
        }
        Ok(Self { root })
    }

    // Ids come from uuid v4 or seeded fixtures; anything else must never name
    // a path outside the collection directory.
    fn valid_id(id: &str) -> bool {
        !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    fn doc_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        if !Self::valid_id(id) {
            bail!("invalid document id: {id}");
        }
        Ok(self.root.join(collection).join(format!("{id}.json")))
    }

    fn read_doc<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        // An id that could not have been issued does not exist.
        if !Self::valid_id(id) {
            return Ok(None);
        }
        let path = self.doc_path(collection, id)?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let doc = serde_json::from_slice(&bytes)
            .with_context(|| format!("decoding document {}", path.display()))?;
        Ok(Some(doc))
    }

    fn write_doc<T: Serialize>(&self, collection: &str, id: &str, doc: &T) -> Result<()> {
        let path = self.doc_path(collection, id)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("committing {}", path.display()))?;
        Ok(())
    }

    fn remove_doc(&self, collection: &str, id: &str) -> Result<bool> {
        if !Self::valid_id(id) {
            return Ok(false);
        }
        let path = self.doc_path(collection, id)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        Ok(true)
    }

    fn list_docs<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let dir = self.root.join(collection);
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else { continue };
            if !name.ends_with(".json") {
                continue;
            }
            let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let doc = serde_json::from_slice(&bytes)
                .with_context(|| format!("decoding document {}", path.display()))?;
            out.push(doc);
        }
        Ok(out)
    }

    // --- pets ---

    pub fn insert_pet(&self, pet: &Pet) -> Result<()> {
        debug!(target: "petshop::storage", "insert_pet id='{}' owner='{}'", pet.id, pet.owner_id);
        self.write_doc(PETS, &pet.id, pet)
    }

    pub fn get_pet(&self, id: &str) -> Result<Option<Pet>> {
        self.read_doc(PETS, id)
    }

    /// Apply a partial update to a pet in one logical write.
    /// Returns None when the pet does not exist.
    pub fn update_pet(&self, id: &str, update: &PetUpdate, now: DateTime<Utc>) -> Result<Option<Pet>> {
        let Some(mut pet) = self.read_doc::<Pet>(PETS, id)? else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            pet.name = name.clone();
        }
        if let Some(species) = &update.species {
            pet.species = species.clone();
        }
        if let Some(description) = &update.description {
            pet.description = description.clone();
        }
        if let Some(image_url) = &update.image_url {
            pet.image_url = Some(image_url.clone());
        }
        if let Some(private) = update.private {
            pet.private = private;
        }
        pet.updated_at = now;
        self.write_doc(PETS, id, &pet)?;
        debug!(target: "petshop::storage", "update_pet id='{}'", id);
        Ok(Some(pet))
    }

    pub fn delete_pet(&self, id: &str) -> Result<bool> {
        debug!(target: "petshop::storage", "delete_pet id='{}'", id);
        self.remove_doc(PETS, id)
    }

    /// List all pets, oldest first.
    pub fn list_pets(&self) -> Result<Vec<Pet>> {
        let mut pets: Vec<Pet> = self.list_docs(PETS)?;
        pets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pets)
    }

    // --- users ---

    pub fn insert_user(&self, user: &User) -> Result<()> {
        debug!(target: "petshop::storage", "insert_user id='{}' username='{}'", user.id, user.username);
        self.write_doc(USERS, &user.id, user)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.read_doc(USERS, id)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let users: Vec<User> = self.list_docs(USERS)?;
        Ok(users.into_iter().find(|u| u.username == username))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.list_docs(USERS)?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    pub fn delete_user(&self, id: &str) -> Result<bool> {
        debug!(target: "petshop::storage", "delete_user id='{}'", id);
        self.remove_doc(USERS, id)
    }
}
