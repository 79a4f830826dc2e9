//! Pedigrees: family members, parent links and affection status.

use std::collections::BTreeMap;

use crate::traits::{Family, Sex};

/// One member of a [`Pedigree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Individual id.
    pub id: String,
    /// Father, if he is part of the family.
    pub father: Option<String>,
    /// Mother, if she is part of the family.
    pub mother: Option<String>,
    /// Sex.
    pub sex: Sex,
    /// Presents the phenotype the pedigree was built for.
    pub affected: bool,
}

/// A family seen through one phenotype.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pedigree {
    members: BTreeMap<String, Member>,
}

impl Pedigree {
    /// Builds the pedigree of `family` for `phenotype`.
    ///
    /// Parent links to individuals outside the family are dropped.
    pub fn from_family(family: &Family, phenotype: &str) -> Self {
        let ids: Vec<&str> = family.members.iter().map(|m| m.id.as_str()).collect();
        let in_family = |parent: &Option<String>| parent.clone().filter(|p| ids.contains(&p.as_str()));
        let members = family
            .members
            .iter()
            .map(|individual| {
                let member = Member {
                    id: individual.id.clone(),
                    father: in_family(&individual.father),
                    mother: in_family(&individual.mother),
                    sex: individual.sex,
                    affected: individual.phenotypes.iter().any(|p| p == phenotype),
                };
                (member.id.clone(), member)
            })
            .collect();
        Self { members }
    }

    /// Adds a member.
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.insert(member.id.clone(), member);
        self
    }

    /// Looks a member up.
    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.get(id)
    }

    /// Members in id order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Children of a member.
    pub fn children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Member> + 'a {
        self.members
            .values()
            .filter(move |m| m.father.as_deref() == Some(id) || m.mother.as_deref() == Some(id))
    }

    /// Returns true if any child of the member is affected.
    pub fn has_affected_child(&self, id: &str) -> bool {
        self.children(id).any(|c| c.affected)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Individual;

    fn trio() -> Family {
        Family::new("F1")
            .with_member(Individual::new("dad", Sex::Male))
            .with_member(Individual::new("mum", Sex::Female))
            .with_member(
                Individual::new("kid", Sex::Female)
                    .with_parents("dad", "mum")
                    .with_phenotype("HP:1"),
            )
    }

    #[test]
    fn test_affection_follows_phenotype() {
        let pedigree = Pedigree::from_family(&trio(), "HP:1");
        assert!(pedigree.member("kid").unwrap().affected);
        assert!(!pedigree.member("dad").unwrap().affected);

        let other = Pedigree::from_family(&trio(), "HP:2");
        assert!(other.members().all(|m| !m.affected));
    }

    #[test]
    fn test_children() {
        let pedigree = Pedigree::from_family(&trio(), "HP:1");
        let children: Vec<&str> = pedigree.children("mum").map(|m| m.id.as_str()).collect();
        assert_eq!(children, vec!["kid"]);
        assert!(pedigree.has_affected_child("dad"));
        assert!(!pedigree.has_affected_child("kid"));
    }

    #[test]
    fn test_parents_outside_family_are_dropped() {
        let family = Family::new("F2")
            .with_member(Individual::new("kid", Sex::Male).with_parents("stranger", "mum"))
            .with_member(Individual::new("mum", Sex::Female));
        let pedigree = Pedigree::from_family(&family, "HP:1");
        let kid = pedigree.member("kid").unwrap();
        assert_eq!(kid.father, None);
        assert_eq!(kid.mother.as_deref(), Some("mum"));
        assert_eq!(pedigree.len(), 2);
    }
}
