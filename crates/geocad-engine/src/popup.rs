//! 要素弹窗
//!
//! 按当前要素/属性状态即时组装：内容HTML、填充色、线型标记、
//! 图层标签。来自DXF文本字段的不可信值在这里清洗，
//! 存储的原值不做改动。

use geocad_core::model::EntityId;
use geocad_core::store::MemoryStore;

/// 弹窗内容
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub content: String,
    pub color: String,
    pub linetype: bool,
    pub layer: String,
}

/// 剥掉全部标记，只留文本
fn clean(value: &str) -> String {
    ammonia::Builder::empty().clean(value).to_string()
}

/// 组装要素弹窗；要素或图层缺失时返回 `None`
pub fn entity_popup(store: &MemoryStore, entity_id: EntityId) -> Option<Popup> {
    let entity = store.entity(entity_id)?;
    let layer = store.layer(entity.layer)?;
    let layer_name = clean(&layer.name);

    let mut content = format!("<p>ID = {}</p>", entity.id);
    content.push_str(&format!("<ul><li>Layer: {}</li>", layer_name));
    let block = entity.block.and_then(|b| store.layer(b));
    if let Some(block) = block {
        content.push_str(&format!("<li>Block: {}</li>", clean(&block.name)));
    }
    let data = store.data_of(entity.id);
    if !data.is_empty() {
        if block.is_some() {
            content.push_str("</ul><p>Attributes</p><ul>");
        }
        for item in &data {
            content.push_str(&format!(
                "<li>{} = {}</li>",
                clean(&item.key),
                clean(&item.value)
            ));
        }
    }
    content.push_str("</ul>");

    Some(Popup {
        content,
        color: layer.color.clone(),
        linetype: layer.linetype,
        layer: format!("Layer - {}", layer_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, GeometryCollection, Point};
    use geocad_core::model::{Drawing, Entity, EntityData, Layer};

    fn store_with_entity(layer_name: &str) -> (MemoryStore, EntityId) {
        let mut store = MemoryStore::new();
        let drawing = store.insert_drawing(Drawing::new("plan", "/tmp/plan.dxf"));
        let layer = store
            .create_layer(Layer::new(drawing, layer_name))
            .expect("layer");
        let collection = GeometryCollection::from(vec![Geometry::Point(Point::new(12.0, 42.0))]);
        let entity = store.create_entity(Entity::aggregate(layer, collection));
        (store, entity)
    }

    #[test]
    fn test_plain_popup() {
        let (store, entity) = store_with_entity("Layer");
        let popup = entity_popup(&store, entity).expect("popup");
        assert_eq!(popup.content, format!("<p>ID = {entity}</p><ul><li>Layer: Layer</li></ul>"));
        assert_eq!(popup.color, "#FFFFFF");
        assert!(popup.linetype);
        assert_eq!(popup.layer, "Layer - Layer");
    }

    #[test]
    fn test_popup_with_data() {
        let (mut store, entity) = store_with_entity("one");
        store.create_entity_data(EntityData::new(entity, "Name", "Room"));
        store.create_entity_data(EntityData::new(entity, "Surface", "100"));
        let popup = entity_popup(&store, entity).expect("popup");
        assert!(popup.content.contains("<li>Name = Room</li>"));
        assert!(popup.content.contains("<li>Surface = 100</li>"));
    }

    #[test]
    fn test_popup_sanitizes_layer_name() {
        let (store, entity) = store_with_entity("<script>alert(1)</script>walls");
        let popup = entity_popup(&store, entity).expect("popup");
        assert!(!popup.content.contains("<script>"));
        assert!(!popup.layer.contains("<script>"));
        assert!(popup.layer.contains("walls"));
    }

    #[test]
    fn test_popup_sanitizes_attribute_values() {
        let (mut store, entity) = store_with_entity("one");
        store.create_entity_data(EntityData::new(
            entity,
            "Name",
            "<script>alert(1)</script>Room",
        ));
        let popup = entity_popup(&store, entity).expect("popup");
        assert!(!popup.content.contains("<script>"));
        assert!(popup.content.contains("Room"));
    }
}
