//! A [`SymbolProvider`] over hand-written sequence points.

use std::sync::Arc;

use crate::{
    debugger::symbols::SymbolProvider,
    metadata::{
        sequencepoints::{SequencePoint, SequencePointArrays},
        token::Token,
    },
    Error, Result,
};

pub fn point(
    document: &str,
    offset: u32,
    line: u32,
    column: u32,
    end_line: u32,
    end_column: u32,
) -> SequencePoint {
    SequencePoint {
        offset,
        start_line: line,
        start_column: column,
        end_line,
        end_column,
        document: Arc::from(document),
    }
}

#[derive(Debug, Default)]
pub struct FakeSymbols {
    methods: Vec<(Token, Vec<SequencePoint>)>,
}

impl FakeSymbols {
    pub fn new() -> Self {
        FakeSymbols::default()
    }

    pub fn method(mut self, token: u32, points: Vec<SequencePoint>) -> Self {
        self.methods.push((Token::new(token), points));
        self
    }

    fn visible(&self, document: &str) -> impl Iterator<Item = (Token, &SequencePoint)> + '_ {
        let document = document.to_string();
        self.methods.iter().flat_map(move |(token, points)| {
            let document = document.clone();
            points
                .iter()
                .filter(move |point| !point.is_special() && point.same_document(&document))
                .map(move |point| (*token, point))
        })
    }
}

impl SymbolProvider for FakeSymbols {
    fn documents(&self) -> Vec<Arc<str>> {
        let mut documents: Vec<Arc<str>> = Vec::new();
        for point in self.methods.iter().flat_map(|(_, points)| points) {
            if !documents.iter().any(|known| *known == point.document) {
                documents.push(point.document.clone());
            }
        }
        documents
    }

    fn sequence_points(&self, method: Token) -> Option<SequencePointArrays> {
        let (_, points) = self.methods.iter().find(|(token, _)| *token == method)?;
        Some(SequencePointArrays {
            offsets: points.iter().map(|point| point.offset).collect(),
            documents: points.iter().map(|point| point.document.clone()).collect(),
            lines: points.iter().map(|point| point.start_line).collect(),
            columns: points.iter().map(|point| point.start_column).collect(),
            end_lines: points.iter().map(|point| point.end_line).collect(),
            end_columns: points.iter().map(|point| point.end_column).collect(),
        })
    }

    fn methods_in_document(&self, document: &str, line: u32) -> Vec<Token> {
        let mut methods = Vec::new();
        for (token, points) in &self.methods {
            let lines = points
                .iter()
                .filter(|point| !point.is_special() && point.same_document(document));
            let first = lines.clone().map(|point| point.start_line).min();
            let last = lines.map(|point| point.end_line).max();
            if let (Some(first), Some(last)) = (first, last) {
                if (first..=last).contains(&line) {
                    methods.push(*token);
                }
            }
        }
        methods
    }

    fn closest_line(&self, document: &str, line: u32) -> Result<u32> {
        if self
            .visible(document)
            .any(|(_, point)| (point.start_line..=point.end_line).contains(&line))
        {
            return Ok(line);
        }
        self.visible(document)
            .map(|(_, point)| point.start_line)
            .filter(|start| *start > line)
            .min()
            .ok_or_else(|| Error::NotFound(format!("code at or after {document}:{line}")))
    }
}
