use super::model::{SermonSection, ThoughtItem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Section-grouped, outline-ordered thought lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectionContainers {
    sections: BTreeMap<SermonSection, Vec<ThoughtItem>>,
}

impl SectionContainers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_section(mut self, section: SermonSection, items: Vec<ThoughtItem>) -> Self {
        self.sections.insert(section, items);
        self
    }

    pub fn section(&self, section: SermonSection) -> &[ThoughtItem] {
        self.sections
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn sections(&self) -> impl Iterator<Item = (SermonSection, &[ThoughtItem])> {
        self.sections
            .iter()
            .map(|(section, items)| (*section, items.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index at which `item` belongs: right after the last item sharing its
    /// outline point, otherwise at the end of the section.
    pub fn insertion_index(&self, section: SermonSection, outline_point_id: Option<&str>) -> usize {
        let items = self.section(section);
        outline_point_id
            .and_then(|point| {
                items
                    .iter()
                    .rposition(|existing| existing.outline_point_id.as_deref() == Some(point))
            })
            .map(|last| last + 1)
            .unwrap_or(items.len())
    }

    /// Inserts `item` at its outline position and returns the index used.
    pub fn insert_ordered(&mut self, section: SermonSection, item: ThoughtItem) -> usize {
        let index = self.insertion_index(section, item.outline_point_id.as_deref());
        self.sections.entry(section).or_default().insert(index, item);
        index
    }

    /// Drops items with `id` from every section except `keep`.
    pub fn remove_from_other_sections(&mut self, id: &str, keep: SermonSection) -> usize {
        let mut removed = 0;
        for (section, items) in self.sections.iter_mut() {
            if *section == keep {
                continue;
            }
            let before = items.len();
            items.retain(|item| item.id != id);
            removed += before - items.len();
        }
        removed
    }

    pub fn locate<F>(&self, predicate: F) -> Option<(SermonSection, usize)>
    where
        F: Fn(&ThoughtItem) -> bool,
    {
        self.sections.iter().find_map(|(section, items)| {
            items
                .iter()
                .position(|item| predicate(item))
                .map(|index| (*section, index))
        })
    }

    pub fn find_mut<F>(&mut self, predicate: F) -> Option<&mut ThoughtItem>
    where
        F: Fn(&ThoughtItem) -> bool,
    {
        self.sections
            .values_mut()
            .flat_map(|items| items.iter_mut())
            .find(|item| predicate(item))
    }

    /// Removes every matching item from whichever section holds it.
    pub fn remove_where<F>(&mut self, predicate: F) -> Vec<(SermonSection, ThoughtItem)>
    where
        F: Fn(&ThoughtItem) -> bool,
    {
        let mut removed = Vec::new();
        for (section, items) in self.sections.iter_mut() {
            let mut index = 0;
            while index < items.len() {
                if predicate(&items[index]) {
                    removed.push((*section, items.remove(index)));
                } else {
                    index += 1;
                }
            }
        }
        removed
    }

    pub(crate) fn item_mut(&mut self, section: SermonSection, index: usize) -> Option<&mut ThoughtItem> {
        self.sections.get_mut(&section)?.get_mut(index)
    }

    pub(crate) fn remove_at(&mut self, section: SermonSection, index: usize) -> Option<ThoughtItem> {
        let items = self.sections.get_mut(&section)?;
        (index < items.len()).then(|| items.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, point: Option<&str>) -> ThoughtItem {
        let item = ThoughtItem::new(id, format!("text {}", id));
        match point {
            Some(point) => item.with_outline_point(point),
            None => item,
        }
    }

    fn ids(containers: &SectionContainers, section: SermonSection) -> Vec<&str> {
        containers.section(section).iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn test_insert_after_last_item_of_same_outline_point() {
        let mut containers = SectionContainers::new().with_section(
            SermonSection::Introduction,
            vec![item("t1", Some("p1")), item("t3", Some("p1")), item("t2", Some("p2"))],
        );

        let index = containers.insert_ordered(SermonSection::Introduction, item("new", Some("p1")));

        assert_eq!(index, 2);
        assert_eq!(ids(&containers, SermonSection::Introduction), vec!["t1", "t3", "new", "t2"]);
    }

    #[test]
    fn test_insert_appends_without_matching_outline_point() {
        let mut containers = SectionContainers::new()
            .with_section(SermonSection::Main, vec![item("t1", Some("p1"))]);

        containers.insert_ordered(SermonSection::Main, item("a", Some("p9")));
        containers.insert_ordered(SermonSection::Main, item("b", None));
        containers.insert_ordered(SermonSection::Conclusion, item("c", None));

        assert_eq!(ids(&containers, SermonSection::Main), vec!["t1", "a", "b"]);
        assert_eq!(ids(&containers, SermonSection::Conclusion), vec!["c"]);
    }

    #[test]
    fn test_remove_from_other_sections_keeps_target() {
        let mut containers = SectionContainers::new()
            .with_section(SermonSection::Main, vec![item("dup", None), item("x", None)])
            .with_section(SermonSection::Conclusion, vec![item("dup", None)]);

        let removed = containers.remove_from_other_sections("dup", SermonSection::Conclusion);

        assert_eq!(removed, 1);
        assert_eq!(ids(&containers, SermonSection::Main), vec!["x"]);
        assert_eq!(ids(&containers, SermonSection::Conclusion), vec!["dup"]);
    }

    #[test]
    fn test_remove_where_and_locate() {
        let mut containers = SectionContainers::new()
            .with_section(SermonSection::Main, vec![item("a", None), item("b", None)]);

        assert_eq!(containers.locate(|i| i.id == "b"), Some((SermonSection::Main, 1)));
        let removed = containers.remove_where(|i| i.id == "a");

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, SermonSection::Main);
        assert_eq!(containers.len(), 1);
        assert_eq!(containers.locate(|i| i.id == "a"), None);
    }
}
