//! Fresh-name picking for synthesized identifiers.

use std::collections::HashSet;

use crate::ast::{visit_file_exprs, ExprKind, File};

/// Picks names that do not collide with identifiers already present.
pub struct NamePicker {
    taken: HashSet<String>,
}

impl NamePicker {
    /// Seed from every identifier appearing in the file (a superset of the
    /// checker's definitions, which is safe for freshness).
    pub fn for_file(file: &File) -> NamePicker {
        let mut taken = HashSet::new();
        visit_file_exprs(file, &mut |e| {
            match &e.kind {
                ExprKind::Ident(id) => {
                    taken.insert(id.name.clone());
                }
                ExprKind::Selector { sel, .. } => {
                    taken.insert(sel.name.clone());
                }
                _ => {}
            }
            true
        });
        NamePicker { taken }
    }

    pub fn from_names(names: impl Iterator<Item = String>) -> NamePicker {
        NamePicker {
            taken: names.collect(),
        }
    }

    pub fn pick(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        for i in 0.. {
            let name = format!("{}{}", base, i);
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
        unreachable!()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_base_name_when_free() {
        let mut p = NamePicker::from_names(std::iter::empty());
        assert_eq!(p.pick("ectx"), "ectx");
        assert_eq!(p.pick("ectx"), "ectx0");
        assert_eq!(p.pick("ectx"), "ectx1");
    }

    #[test]
    fn skips_taken_names() {
        let mut p =
            NamePicker::from_names(["recvChan".to_string(), "recvChan0".to_string()].into_iter());
        assert_eq!(p.pick("recvChan"), "recvChan1");
    }
}
