//! 内存记录仓库
//!
//! 持久化引擎是外部协作者；核心只依赖这里实现的仓库语义：
//! 按 `(drawing, name, is_block)` 的 get-or-create、唯一约束冲突信号、
//! 级联删除，以及一次解析-提取周期的事务边界。
//! 图层名冲突以随机后缀重试恰好一次，第二次冲突按致命错误传播。

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::StoreError;
use crate::model::{
    Drawing, DrawingId, Entity, EntityData, EntityDataId, EntityId, Layer, LayerId,
};

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    drawings: BTreeMap<DrawingId, Drawing>,
    layers: BTreeMap<LayerId, Layer>,
    entities: BTreeMap<EntityId, Entity>,
    entity_data: BTreeMap<EntityDataId, EntityData>,
    layer_index: HashMap<(DrawingId, String, bool), LayerId>,
    next_id: u64,
}

fn random_token() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    token[..7].to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// 单个解析-提取周期的事务边界
    ///
    /// 闭包失败时回滚到进入前的状态：部分提取不可见。
    pub fn transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let checkpoint = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self = checkpoint;
                Err(err)
            }
        }
    }

    // ========== Drawing ==========

    pub fn insert_drawing(&mut self, mut drawing: Drawing) -> DrawingId {
        if drawing.id == 0 {
            drawing.id = self.alloc_id();
        }
        let id = drawing.id;
        self.drawings.insert(id, drawing);
        id
    }

    pub fn upsert_drawing(&mut self, drawing: &Drawing) {
        self.drawings.insert(drawing.id, drawing.clone());
    }

    /// 装载图纸：返回带刷新快照基线的副本
    pub fn drawing(&self, id: DrawingId) -> Option<Drawing> {
        self.drawings.get(&id).map(|d| {
            let mut loaded = d.clone();
            loaded.refresh_baseline();
            loaded
        })
    }

    pub fn drawings(&self) -> impl Iterator<Item = &Drawing> {
        self.drawings.values()
    }

    // ========== Layer ==========

    /// 创建图层，违反唯一约束时返回错误
    pub fn create_layer(&mut self, mut layer: Layer) -> Result<LayerId, StoreError> {
        let key = (layer.drawing, layer.name.clone(), layer.is_block);
        if self.layer_index.contains_key(&key) {
            return Err(StoreError::UniqueViolation {
                drawing: layer.drawing,
                name: layer.name,
                is_block: layer.is_block,
            });
        }
        if layer.id == 0 {
            layer.id = self.alloc_id();
        }
        let id = layer.id;
        self.layer_index.insert(key, id);
        self.layers.insert(id, layer);
        Ok(id)
    }

    /// 创建图层，名字冲突时以随机后缀重试一次
    pub fn save_layer(&mut self, layer: Layer) -> Result<LayerId, StoreError> {
        match self.create_layer(layer.clone()) {
            Err(StoreError::UniqueViolation { .. }) => {
                let mut renamed = layer;
                renamed.name = format!("{}_{}", renamed.name, random_token());
                debug!(name = %renamed.name, "layer name collision, retrying with suffix");
                self.create_layer(renamed)
            }
            other => other,
        }
    }

    /// 按 `(drawing, name, is_block)` 取回或新建
    pub fn get_or_create_layer(&mut self, mut template: Layer) -> (LayerId, bool) {
        let key = (template.drawing, template.name.clone(), template.is_block);
        if let Some(&id) = self.layer_index.get(&key) {
            return (id, false);
        }
        if template.id == 0 {
            template.id = self.alloc_id();
        }
        let id = template.id;
        self.layer_index.insert(key, id);
        self.layers.insert(id, template);
        (id, true)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    pub fn update_layer(&mut self, layer: &Layer) -> Result<(), StoreError> {
        let old = self
            .layers
            .get(&layer.id)
            .ok_or(StoreError::NotFound("layer", layer.id))?
            .clone();
        let new_key = (layer.drawing, layer.name.clone(), layer.is_block);
        let old_key = (old.drawing, old.name.clone(), old.is_block);
        if new_key != old_key {
            if self.layer_index.contains_key(&new_key) {
                return Err(StoreError::UniqueViolation {
                    drawing: layer.drawing,
                    name: layer.name.clone(),
                    is_block: layer.is_block,
                });
            }
            self.layer_index.remove(&old_key);
            self.layer_index.insert(new_key, layer.id);
        }
        self.layers.insert(layer.id, layer.clone());
        Ok(())
    }

    /// 图纸的所有图层，按名字排序
    pub fn layers_of(&self, drawing: DrawingId) -> Vec<&Layer> {
        let mut layers: Vec<&Layer> = self
            .layers
            .values()
            .filter(|l| l.drawing == drawing)
            .collect();
        layers.sort_by(|a, b| a.name.cmp(&b.name));
        layers
    }

    /// 删除图纸的全部图层，级联删除要素与属性
    pub fn delete_layers_of(&mut self, drawing: DrawingId) {
        let layer_ids: Vec<LayerId> = self
            .layers
            .values()
            .filter(|l| l.drawing == drawing)
            .map(|l| l.id)
            .collect();
        if layer_ids.is_empty() {
            return;
        }
        for id in &layer_ids {
            if let Some(layer) = self.layers.remove(id) {
                self.layer_index
                    .remove(&(layer.drawing, layer.name, layer.is_block));
            }
        }
        let entity_ids: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| {
                layer_ids.contains(&e.layer)
                    || e.block.map(|b| layer_ids.contains(&b)).unwrap_or(false)
            })
            .map(|e| e.id)
            .collect();
        for id in entity_ids {
            self.delete_entity(id);
        }
        debug!(drawing, layers = layer_ids.len(), "deleted derived layers");
    }

    // ========== Entity ==========

    pub fn create_entity(&mut self, mut entity: Entity) -> EntityId {
        if entity.id == 0 {
            entity.id = self.alloc_id();
        }
        let id = entity.id;
        self.entities.insert(id, entity);
        id
    }

    pub fn update_entity(&mut self, entity: &Entity) -> Result<(), StoreError> {
        if !self.entities.contains_key(&entity.id) {
            return Err(StoreError::NotFound("entity", entity.id));
        }
        self.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// 图层的要素，按创建顺序
    pub fn entities_of(&self, layer: LayerId) -> Vec<&Entity> {
        self.entities.values().filter(|e| e.layer == layer).collect()
    }

    /// 引用某块模板的全部插入要素，按创建顺序
    pub fn block_insertions(&self, block: LayerId) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| e.block == Some(block))
            .collect()
    }

    pub fn delete_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
        let data_ids: Vec<EntityDataId> = self
            .entity_data
            .values()
            .filter(|d| d.entity == id)
            .map(|d| d.id)
            .collect();
        for data_id in data_ids {
            self.entity_data.remove(&data_id);
        }
    }

    // ========== EntityData ==========

    pub fn create_entity_data(&mut self, mut data: EntityData) -> EntityDataId {
        if data.id == 0 {
            data.id = self.alloc_id();
        }
        let id = data.id;
        self.entity_data.insert(id, data);
        id
    }

    /// 要素的属性，按创建顺序
    pub fn data_of(&self, entity: EntityId) -> Vec<&EntityData> {
        self.entity_data
            .values()
            .filter(|d| d.entity == entity)
            .collect()
    }

    pub fn delete_entity_data(&mut self, id: EntityDataId) {
        self.entity_data.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, GeometryCollection, Point};

    #[test]
    fn test_layer_unique_violation_signaled() {
        let mut store = MemoryStore::new();
        let drawing = store.insert_drawing(Drawing::new("plan", "/tmp/plan.dxf"));
        store
            .create_layer(Layer::new(drawing, "walls"))
            .expect("first");
        let err = store.create_layer(Layer::new(drawing, "walls")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[test]
    fn test_layer_collision_retried_with_suffix() {
        let mut store = MemoryStore::new();
        let drawing = store.insert_drawing(Drawing::new("plan", "/tmp/plan.dxf"));
        store.save_layer(Layer::new(drawing, "walls")).expect("first");
        let second = store.save_layer(Layer::new(drawing, "walls")).expect("retried");
        let renamed = store.layer(second).expect("layer");
        assert_ne!(renamed.name, "walls");
        assert!(renamed.name.starts_with("walls_"));
    }

    #[test]
    fn test_block_flag_distinguishes_names() {
        let mut store = MemoryStore::new();
        let drawing = store.insert_drawing(Drawing::new("plan", "/tmp/plan.dxf"));
        store.create_layer(Layer::new(drawing, "door")).expect("layer");
        let block = Layer::new(drawing, "door").as_block(GeometryCollection::default());
        store.create_layer(block).expect("same name as block");
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let mut store = MemoryStore::new();
        let drawing = store.insert_drawing(Drawing::new("plan", "/tmp/plan.dxf"));
        let (first, created) = store.get_or_create_layer(Layer::new(drawing, "walls"));
        assert!(created);
        let (second, created) = store.get_or_create_layer(Layer::new(drawing, "walls"));
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cascade_delete() {
        let mut store = MemoryStore::new();
        let drawing = store.insert_drawing(Drawing::new("plan", "/tmp/plan.dxf"));
        let layer = store.create_layer(Layer::new(drawing, "walls")).expect("layer");
        let collection = GeometryCollection::from(vec![Geometry::Point(Point::new(12.0, 42.0))]);
        let entity = store.create_entity(Entity::aggregate(layer, collection));
        store.create_entity_data(EntityData::new(entity, "Name", "Room"));

        store.delete_layers_of(drawing);
        assert!(store.layers_of(drawing).is_empty());
        assert!(store.entity(entity).is_none());
        assert!(store.data_of(entity).is_empty());
    }

    #[test]
    fn test_transaction_rolls_back() {
        let mut store = MemoryStore::new();
        let drawing = store.insert_drawing(Drawing::new("plan", "/tmp/plan.dxf"));
        let result: Result<(), StoreError> = store.transaction(|st| {
            st.create_layer(Layer::new(drawing, "walls"))?;
            st.create_layer(Layer::new(drawing, "walls"))?;
            Ok(())
        });
        assert!(result.is_err());
        // 整个事务不可见
        assert!(store.layers_of(drawing).is_empty());
    }

    #[test]
    fn test_drawing_loaded_with_fresh_baseline() {
        let mut store = MemoryStore::new();
        let mut drawing = Drawing::new("plan", "/tmp/plan.dxf");
        drawing.origin = Some(Point::new(12.0, 42.0));
        let id = store.insert_drawing(drawing);
        let loaded = store.drawing(id).expect("drawing");
        assert!(!loaded.origin_changed());
    }
}
