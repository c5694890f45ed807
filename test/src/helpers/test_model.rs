use rd_shared::{RdCall, RdList, RdMap, RdModel, RdProperty, RdSet, RdSignal};

/// A model with one of each entity kind, built identically on both peers.
#[derive(Clone)]
pub struct TestModel {
    pub model: RdModel,
    pub title: RdProperty<String>,
    pub scores: RdList<i32>,
    pub tags: RdSet<String>,
    pub inventory: RdMap<String, i32>,
    pub chat: RdSignal<String>,
    pub lookup: RdCall<String, i32>,
}

impl TestModel {
    /// `master` decides which side's map writes win.
    pub fn new(master: bool) -> Self {
        let title = RdProperty::new(String::from("untitled"));
        let scores = RdList::new();
        let tags = RdSet::new();
        let inventory = RdMap::new();
        inventory.set_master(master);
        let chat = RdSignal::new();
        let lookup = RdCall::new();

        let model = RdModel::new()
            .with_member("title", title.clone())
            .with_member("scores", scores.clone())
            .with_member("tags", tags.clone())
            .with_member("inventory", inventory.clone())
            .with_member("chat", chat.clone())
            .with_member("lookup", lookup.clone());

        Self {
            model,
            title,
            scores,
            tags,
            inventory,
            chat,
            lookup,
        }
    }

    /// Client and server halves, the server holding the master map.
    pub fn pair() -> (Self, Self) {
        (Self::new(false), Self::new(true))
    }
}
