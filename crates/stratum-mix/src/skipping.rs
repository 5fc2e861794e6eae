use stratum_errors::{Error, Result};
use stratum_inputs::{Input, TextRange, check_position, check_ranges};
use stratum_tree::{NodeType, PartialParse, Parser, Tree, TreeFragment};

/// Stands in for a parser that is not available yet. Produces a single
/// anonymous node spanning the parsed ranges, so the region shows up as
/// unparsed text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkippingParser;

struct SkippingParse {
    from: u32,
    to: u32,
    doc_len: u32,
    stopped_at: Option<u32>,
}

impl Parser for SkippingParser {
    fn create_parse<'a>(
        &self,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Result<Box<dyn PartialParse + 'a>> {
        let ranges = check_ranges(ranges, input)?;
        TreeFragment::check(fragments, input.len())?;
        let from = ranges.first().map_or(0, |r| u32::from(r.start()));
        let to = ranges.last().map_or(0, |r| u32::from(r.end()));
        Ok(Box::new(SkippingParse { from, to, doc_len: input.len(), stopped_at: None }))
    }
}

impl PartialParse for SkippingParse {
    fn advance(&mut self) -> Result<Option<Tree>> {
        let end = self.stopped_at.map_or(self.to, |stop| stop.clamp(self.from, self.to));
        Ok(Some(Tree::new(NodeType::none(), Vec::new(), Vec::new(), end - self.from)))
    }

    fn parsed_pos(&self) -> u32 {
        self.from
    }

    fn stop_at(&mut self, pos: u32) -> Result<()> {
        check_position(pos, self.doc_len)?;
        if let Some(current) = self.stopped_at.filter(|&current| current < pos) {
            return Err(Error::StopAtMovedForward { current, requested: pos });
        }
        self.stopped_at = Some(pos);
        Ok(())
    }

    fn stopped_at(&self) -> Option<u32> {
        self.stopped_at
    }
}
