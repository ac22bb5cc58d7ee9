//! The external resource store: textures, material instances and meshes
//! addressed by name.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::precompute::{Table, TableExtent};
use crate::render::{MaterialInstance, ShaderMacros};

/// A non-owning reference to a texture held by a store.
///
/// Two handles are equal when they name the same registration.
#[derive(Clone)]
pub struct TextureHandle {
    name: Arc<str>,
    id: u64,
    extent: TableExtent,
}

impl TextureHandle {
    pub fn new(name: &str, id: u64, extent: TableExtent) -> Self {
        Self {
            name: Arc::from(name),
            id,
            extent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn extent(&self) -> TableExtent {
        self.extent
    }
}

impl PartialEq for TextureHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name
    }
}

impl Eq for TextureHandle {}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextureHandle({}#{})", self.name, self.id)
    }
}

/// A named indexed mesh held by a store. Positions are homogeneous.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshHandle {
    name: Arc<str>,
    positions: Arc<[[f32; 4]]>,
    indices: Arc<[u32]>,
}

impl MeshHandle {
    pub fn new(name: &str, positions: &[[f32; 4]], indices: &[u32]) -> Self {
        Self {
            name: Arc::from(name),
            positions: Arc::from(positions),
            indices: Arc::from(indices),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn positions(&self) -> &[[f32; 4]] {
        &self.positions
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

/// Owner of textures, material instances and meshes shared by every
/// atmosphere. Implementations must be safe to call from several threads.
pub trait ResourceStore: Send + Sync {
    fn has_texture(&self, name: &str) -> bool;

    fn texture(&self, name: &str) -> Option<TextureHandle>;

    /// Take ownership of `table` under `name`, replacing any previous entry.
    fn register_texture(&self, name: &str, table: Table) -> TextureHandle;

    fn material_instance(
        &self,
        name: &str,
        macros: &ShaderMacros,
    ) -> Option<Arc<dyn MaterialInstance>>;

    fn mesh(&self, name: &str) -> Option<MeshHandle>;
}

struct StoredTexture {
    handle: TextureHandle,
    data: Option<Arc<Table>>,
}

/// In-process store backed by concurrent maps.
#[derive(Default)]
pub struct MemoryResourceStore {
    textures: DashMap<String, StoredTexture>,
    materials: DashMap<String, Arc<dyn MaterialInstance>>,
    requested_macros: DashMap<String, ShaderMacros>,
    meshes: DashMap<String, MeshHandle>,
    next_id: AtomicU64,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register an authored texture whose data lives elsewhere.
    pub fn register_external_texture(&self, name: &str, extent: TableExtent) -> TextureHandle {
        let handle = TextureHandle::new(name, self.next_id(), extent);
        self.textures.insert(
            name.to_string(),
            StoredTexture {
                handle: handle.clone(),
                data: None,
            },
        );
        handle
    }

    pub fn register_material(&self, name: &str, material: Arc<dyn MaterialInstance>) {
        self.materials.insert(name.to_string(), material);
    }

    pub fn register_mesh(&self, mesh: MeshHandle) {
        self.meshes.insert(mesh.name().to_string(), mesh);
    }

    /// Table data of a generated texture.
    pub fn texture_data(&self, name: &str) -> Option<Arc<Table>> {
        self.textures.get(name).and_then(|t| t.data.clone())
    }

    /// Macros of the last request for material `name`.
    pub fn requested_macros(&self, name: &str) -> Option<ShaderMacros> {
        self.requested_macros.get(name).map(|m| m.clone())
    }

    pub fn texture_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.textures.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl ResourceStore for MemoryResourceStore {
    fn has_texture(&self, name: &str) -> bool {
        self.textures.contains_key(name)
    }

    fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures.get(name).map(|t| t.handle.clone())
    }

    fn register_texture(&self, name: &str, table: Table) -> TextureHandle {
        let handle = TextureHandle::new(name, self.next_id(), table.extent());
        self.textures.insert(
            name.to_string(),
            StoredTexture {
                handle: handle.clone(),
                data: Some(Arc::new(table)),
            },
        );
        handle
    }

    fn material_instance(
        &self,
        name: &str,
        macros: &ShaderMacros,
    ) -> Option<Arc<dyn MaterialInstance>> {
        self.requested_macros
            .insert(name.to_string(), macros.clone());
        self.materials.get(name).map(|m| Arc::clone(m.value()))
    }

    fn mesh(&self, name: &str) -> Option<MeshHandle> {
        self.meshes.get(name).map(|m| m.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precompute::MemoryBudget;
    use crate::testing::RecordingMaterial;

    fn table(name: &str) -> Table {
        Table::allocate(name, TableExtent::d2(2, 2), &mut MemoryBudget::default()).unwrap()
    }

    #[test]
    fn test_register_and_fetch_texture() {
        let store = MemoryResourceStore::new();
        assert!(!store.has_texture("a"));
        let handle = store.register_texture("a", table("a"));
        assert!(store.has_texture("a"));
        assert_eq!(store.texture("a"), Some(handle.clone()));
        assert_eq!(handle.extent(), TableExtent::d2(2, 2));
        assert_eq!(store.texture_data("a").unwrap().extent(), handle.extent());
    }

    #[test]
    fn test_reregistration_yields_new_identity() {
        let store = MemoryResourceStore::new();
        let first = store.register_texture("a", table("a"));
        let second = store.register_texture("a", table("a"));
        assert_ne!(first, second);
        assert_eq!(store.texture("a"), Some(second));
    }

    #[test]
    fn test_external_texture_has_no_data() {
        let store = MemoryResourceStore::new();
        store.register_external_texture("cloud", TableExtent::d3(4, 4, 4));
        assert!(store.has_texture("cloud"));
        assert!(store.texture_data("cloud").is_none());
    }

    #[test]
    fn test_material_lookup_records_macros() {
        let store = MemoryResourceStore::new();
        store.register_material("sky", Arc::new(RecordingMaterial::new("sky")));
        let macros = ShaderMacros::new().define("USE_LUMINANCE", 1);
        let material = store.material_instance("sky", &macros).unwrap();
        assert_eq!(material.name(), "sky");
        assert_eq!(store.requested_macros("sky"), Some(macros.clone()));
        assert!(store.material_instance("missing", &macros).is_none());
    }

    #[test]
    fn test_mesh_lookup() {
        let store = MemoryResourceStore::new();
        assert!(store.mesh("quad").is_none());
        store.register_mesh(MeshHandle::new("quad", &[[0.0; 4]; 3], &[0, 1, 2]));
        let mesh = store.mesh("quad").unwrap();
        assert_eq!(mesh.name(), "quad");
        assert_eq!(mesh.positions().len(), 3);
        assert_eq!(mesh.indices(), [0, 1, 2]);
    }

    #[test]
    fn test_texture_names_sorted() {
        let store = MemoryResourceStore::new();
        store.register_texture("b", table("b"));
        store.register_texture("a", table("a"));
        assert_eq!(store.texture_names(), ["a", "b"]);
    }
}
