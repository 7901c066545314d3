//! # Element Palette
//!
//! Commands that insert ready-made elements at the session's insertion
//! point. Each command builds one aggregate so a single undo removes the
//! whole insertion.
//!
//! Element numbering (`Button 1`, `Button 2`, ...) comes from per-tag
//! counters owned by the palette instance.

use crate::listener::TransactionListener;
use crate::node::NodeId;
use crate::session::EditSession;
use crate::transaction::{Aggregate, Transaction};
use crate::EditorError;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::info;

#[derive(Debug, Default)]
pub struct Palette {
    element_counts: HashMap<String, usize>,

    /// Registered around each command for its duration only
    listener: Option<Rc<dyn TransactionListener>>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(listener: Rc<dyn TransactionListener>) -> Self {
        Self {
            element_counts: HashMap::new(),
            listener: Some(listener),
        }
    }

    /// How many elements of `tag` this palette has numbered so far
    pub fn element_count(&self, tag: &str) -> usize {
        self.element_counts.get(tag).copied().unwrap_or(0)
    }

    /// Bump and return the counter for `tag`; the first call yields 1
    pub fn increment_element_count(&mut self, tag: &str) -> usize {
        let count = self.element_counts.entry(tag.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Insert `<button value="Button N" id="button_N">`
    pub fn insert_button(&mut self, session: &mut EditSession) -> Result<NodeId, EditorError> {
        let n = self.increment_element_count("button");
        self.insert_single_element(
            session,
            "button",
            &["value", "id"],
            &[format!("Button {n}"), format!("button_{n}")],
        )
    }

    /// Insert `<textfield value="Textfield N" id="textfield_N">`
    pub fn insert_text_field(&mut self, session: &mut EditSession) -> Result<NodeId, EditorError> {
        let n = self.increment_element_count("textfield");
        self.insert_single_element(
            session,
            "textfield",
            &["value", "id"],
            &[format!("Textfield {n}"), format!("textfield_{n}")],
        )
    }

    /// Insert a radiogroup holding one radio; returns the group's id
    pub fn insert_radio_group(&mut self, session: &mut EditSession) -> Result<NodeId, EditorError> {
        let radio_n = self.increment_element_count("radio");
        let group_n = self.increment_element_count("radiogroup");
        let group_name = format!("radiogroup_{group_n}");

        let point = session.insertion_point()?;
        let group = session.create_element("radiogroup", point.parent, point.index);
        let group_id = group.node_id();
        let group_attrs = session.change_attributes(group_id, ["id"], [group_name.clone()], false);

        let radio = session.create_element("radio", group_id, 0);
        let radio_attrs = session.change_attributes(
            radio.node_id(),
            ["value", "group", "id"],
            [format!("Radio {radio_n}"), group_name, format!("radio_{radio_n}")],
            false,
        );

        let aggregate = Aggregate::new(vec![group.into(), group_attrs, radio.into(), radio_attrs])
            .with_description("Insert radiogroup");
        self.submit(session, aggregate.into())?;

        info!(session = %session.id, node = %group_id, "Inserted radiogroup");
        Ok(group_id)
    }

    fn insert_single_element(
        &self,
        session: &mut EditSession,
        tag: &str,
        names: &[&str],
        values: &[String],
    ) -> Result<NodeId, EditorError> {
        let point = session.insertion_point()?;
        let element = session.create_element(tag, point.parent, point.index);
        let id = element.node_id();
        let attrs = session.change_attributes(id, names.iter().copied(), values.iter().cloned(), false);

        let aggregate =
            Aggregate::new(vec![element.into(), attrs]).with_description(format!("Insert {tag}"));
        self.submit(session, aggregate.into())?;

        info!(session = %session.id, node = %id, tag, "Inserted element");
        Ok(id)
    }

    fn submit(&self, session: &mut EditSession, transaction: Transaction) -> Result<(), EditorError> {
        match &self.listener {
            Some(listener) => session.do_transaction_observed(transaction, listener),
            None => session.do_transaction(transaction),
        }
    }
}
