//! Compiles a parsed query tree into a runnable iterator tree, resolving
//! field names against a `Schema` and erasing nothing until the very top
//! (callers get a `Box<IteratorNode>`, a concrete tagged-sum value, not a
//! trait object).

use crate::error::{CoreError, Result};
use crate::iterator::{Deadline, IdListIterator, IndexIterator, IntersectIterator, IteratorNode, NumericReader, OptionalIterator, NotIterator, TermReader, UnionIterator, WildcardIterator};
use crate::query::ast::QueryNode;
use crate::query::schema::Schema;

pub struct Compiler<'a> {
    schema: &'a Schema,
    deadline: Deadline,
}

impl<'a> Compiler<'a> {
    pub fn new(schema: &'a Schema, deadline: Deadline) -> Self {
        Compiler { schema, deadline }
    }

    pub fn compile(&self, node: &QueryNode) -> Result<Box<IteratorNode>> {
        match node {
            QueryNode::Term { field, token } => self.compile_term(field.as_deref(), token),
            QueryNode::Phrase { field, tokens, slop, in_order } => self.compile_phrase(field.as_deref(), tokens, *slop, *in_order),
            QueryNode::NumericRange { field, min, max } => self.compile_numeric_range(field, *min, *max),
            QueryNode::Tag { field, values } => self.compile_tag(field, values),
            QueryNode::Wildcard => Ok(Box::new(IteratorNode::Wildcard(self.universe()))),
            QueryNode::And(children) => self.compile_and(children),
            QueryNode::Or(children) => self.compile_or(children),
            QueryNode::Not(child) => {
                let compiled = self.compile(child)?;
                Ok(Box::new(IteratorNode::Not(NotIterator::new(compiled, self.universe()))))
            }
            QueryNode::Optional(child) => {
                let compiled = self.compile(child)?;
                Ok(Box::new(IteratorNode::Optional(OptionalIterator::new(compiled, self.universe()))))
            }
        }
    }

    fn universe(&self) -> WildcardIterator {
        WildcardIterator::new(self.schema.doc_table().clone())
    }

    fn field_mask(&self, field: Option<&str>) -> Result<Option<u64>> {
        match field {
            None => Ok(None),
            Some(name) => self
                .schema
                .text_field_mask(name)
                .map(Some)
                .ok_or_else(|| CoreError::BadAttr(name.to_string())),
        }
    }

    fn compile_term(&self, field: Option<&str>, token: &str) -> Result<Box<IteratorNode>> {
        let mask = self.field_mask(field)?;
        let Some(idx) = self.schema.terms().get(token.as_bytes()) else {
            return Ok(Box::new(IteratorNode::IdList(IdListIterator::new(Vec::new()))));
        };
        let reader = match mask {
            Some(m) => TermReader::with_field_mask(idx, self.deadline, m)?,
            None => TermReader::new(idx, self.deadline)?,
        };
        Ok(Box::new(IteratorNode::Term(reader)))
    }

    fn compile_phrase(&self, field: Option<&str>, tokens: &[String], slop: u32, in_order: bool) -> Result<Box<IteratorNode>> {
        if tokens.is_empty() {
            return Ok(Box::new(IteratorNode::IdList(IdListIterator::new(Vec::new()))));
        }
        if tokens.len() == 1 {
            return self.compile_term(field, &tokens[0]);
        }
        let mut children = Vec::with_capacity(tokens.len());
        for token in tokens {
            children.push(self.compile_term(field, token)?);
        }
        let intersect = IntersectIterator::new(children).with_slop(slop, in_order);
        Ok(Box::new(IteratorNode::Intersect(intersect)))
    }

    fn compile_numeric_range(&self, field: &str, min: f64, max: f64) -> Result<Box<IteratorNode>> {
        let tree = self.schema.numeric_field(field).ok_or_else(|| CoreError::BadAttr(field.to_string()))?;
        let leaves = tree.overlapping_leaves(min, max);
        if leaves.is_empty() {
            return Ok(Box::new(IteratorNode::IdList(IdListIterator::new(Vec::new()))));
        }
        let mut children = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let reader = NumericReader::new(leaf, min, max, self.deadline)?;
            children.push(Box::new(IteratorNode::Numeric(reader)));
        }
        if children.len() == 1 {
            return Ok(children.pop().unwrap());
        }
        Ok(Box::new(IteratorNode::Union(UnionIterator::new(children))))
    }

    fn compile_tag(&self, field: &str, values: &[String]) -> Result<Box<IteratorNode>> {
        let tags = self.schema.tag_field(field).ok_or_else(|| CoreError::BadAttr(field.to_string()))?;
        let mut children = Vec::new();
        for value in values {
            if let Some(idx) = tags.get(value.as_bytes()) {
                children.push(Box::new(IteratorNode::Term(TermReader::new(idx, self.deadline)?)));
            }
        }
        if children.is_empty() {
            return Ok(Box::new(IteratorNode::IdList(IdListIterator::new(Vec::new()))));
        }
        if children.len() == 1 {
            return Ok(children.pop().unwrap());
        }
        Ok(Box::new(IteratorNode::Union(UnionIterator::new(children))))
    }

    /// Compiled children are ordered ascending by `num_estimated()` so the
    /// intersect's converge loop skips through the smallest candidate set
    /// first, matching the galloping-friendly ordering the planner is
    /// meant to pick.
    fn compile_and(&self, nodes: &[QueryNode]) -> Result<Box<IteratorNode>> {
        let mut children: Vec<Box<IteratorNode>> = nodes.iter().map(|n| self.compile(n)).collect::<Result<_>>()?;
        children.sort_by_key(|c| c.num_estimated());
        if children.len() == 1 {
            return Ok(children.pop().unwrap());
        }
        Ok(Box::new(IteratorNode::Intersect(IntersectIterator::new(children))))
    }

    fn compile_or(&self, nodes: &[QueryNode]) -> Result<Box<IteratorNode>> {
        let children: Vec<Box<IteratorNode>> = nodes.iter().map(|n| self.compile(n)).collect::<Result<_>>()?;
        if children.len() == 1 {
            return Ok(children.into_iter().next().unwrap());
        }
        Ok(Box::new(IteratorNode::Union(UnionIterator::new(children))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctable::{DocFlags, DocTable};
    use crate::inverted_index::Posting;
    use crate::iterator::ReadResult;
    use std::sync::Arc;

    fn put_doc(table: &DocTable, key: &str) -> u64 {
        table.put(key.as_bytes(), 1.0, DocFlags::default(), None).unwrap().handle.id
    }

    fn run(node: &mut IteratorNode) -> Vec<u64> {
        let mut seen = Vec::new();
        loop {
            match node.read().unwrap() {
                ReadResult::Found(p) => seen.push(p.doc_id),
                ReadResult::Eof => break,
                _ => break,
            }
        }
        seen
    }

    #[test]
    fn compiles_a_bare_term_into_a_term_reader() {
        let doc_table = Arc::new(DocTable::new(1000));
        let mut schema = Schema::new(doc_table.clone());
        schema.add_text_field("title").unwrap();
        let (idx, _) = schema.terms().get_or_create(b"hello");
        let id1 = put_doc(&doc_table, "doc1");
        idx.write().write_entry(id1, &Posting { doc_id: id1, freq: 1, field_mask: 1, offsets: vec![], numeric_value: None }).unwrap();

        let compiler = Compiler::new(&schema, Deadline::far_future());
        let node = QueryNode::Term { field: None, token: "hello".to_string() };
        let mut compiled = compiler.compile(&node).unwrap();
        assert_eq!(run(&mut compiled), vec![id1]);
    }

    #[test]
    fn unknown_term_compiles_to_an_empty_result() {
        let doc_table = Arc::new(DocTable::new(1000));
        let schema = Schema::new(doc_table);
        let compiler = Compiler::new(&schema, Deadline::far_future());
        let node = QueryNode::Term { field: None, token: "nope".to_string() };
        let mut compiled = compiler.compile(&node).unwrap();
        assert_eq!(run(&mut compiled), Vec::<u64>::new());
    }

    #[test]
    fn and_intersects_two_terms() {
        let doc_table = Arc::new(DocTable::new(1000));
        let mut schema = Schema::new(doc_table.clone());
        schema.add_text_field("body").unwrap();
        let id1 = put_doc(&doc_table, "doc1");
        let id2 = put_doc(&doc_table, "doc2");

        let (a, _) = schema.terms().get_or_create(b"red");
        a.write().write_entry(id1, &Posting { doc_id: id1, freq: 1, field_mask: 1, offsets: vec![], numeric_value: None }).unwrap();
        a.write().write_entry(id2, &Posting { doc_id: id2, freq: 1, field_mask: 1, offsets: vec![], numeric_value: None }).unwrap();

        let (b, _) = schema.terms().get_or_create(b"car");
        b.write().write_entry(id2, &Posting { doc_id: id2, freq: 1, field_mask: 1, offsets: vec![], numeric_value: None }).unwrap();

        let compiler = Compiler::new(&schema, Deadline::far_future());
        let node = QueryNode::And(vec![
            QueryNode::Term { field: None, token: "red".to_string() },
            QueryNode::Term { field: None, token: "car".to_string() },
        ]);
        let mut compiled = compiler.compile(&node).unwrap();
        assert_eq!(run(&mut compiled), vec![id2]);
    }

    #[test]
    fn numeric_range_unknown_field_is_a_bad_attr_error() {
        let doc_table = Arc::new(DocTable::new(1000));
        let schema = Schema::new(doc_table);
        let compiler = Compiler::new(&schema, Deadline::far_future());
        let node = QueryNode::NumericRange { field: "price".to_string(), min: 0.0, max: 10.0 };
        assert!(matches!(compiler.compile(&node), Err(CoreError::BadAttr(_))));
    }

    #[test]
    fn not_excludes_matching_docs_from_the_universe() {
        let doc_table = Arc::new(DocTable::new(1000));
        let mut schema = Schema::new(doc_table.clone());
        schema.add_text_field("body").unwrap();
        let id1 = put_doc(&doc_table, "doc1");
        let id2 = put_doc(&doc_table, "doc2");

        let (idx, _) = schema.terms().get_or_create(b"banned");
        idx.write().write_entry(id1, &Posting { doc_id: id1, freq: 1, field_mask: 1, offsets: vec![], numeric_value: None }).unwrap();

        let compiler = Compiler::new(&schema, Deadline::far_future());
        let node = QueryNode::Not(Box::new(QueryNode::Term { field: None, token: "banned".to_string() }));
        let mut compiled = compiler.compile(&node).unwrap();
        assert_eq!(run(&mut compiled), vec![id2]);
    }
}
