use serde::{Deserialize, Serialize};

use crate::{
    builder::CommandBuilder,
    cursor::{Cursor, CursorOrder, CursorType},
    error::QueryError,
};

const DEFAULT_PAGE_SIZE: u16 = 40;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge<N> {
    pub cursor: CursorType,
    pub node: N,
}

impl<N: Cursor> From<N> for Edge<N> {
    fn from(node: N) -> Self {
        Self {
            cursor: node.to_cursor(),
            node,
        }
    }
}

#[derive(Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub has_previous_page: bool,
    pub has_next_page: bool,
    pub start_cursor: Option<CursorType>,
    pub end_cursor: Option<CursorType>,
}

/// One page of nodes, in display order.
#[derive(Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult<N> {
    pub edges: Vec<Edge<N>>,
    pub page_info: PageInfo,
}

impl<N: Cursor> QueryResult<N> {
    /// Builds a page from rows fetched with the clauses written by [`push_page`].
    ///
    /// Rows arrive in walk order and may hold one lookahead row beyond the
    /// limit, which only tells whether more rows exist in that direction.
    pub fn from_rows(mut rows: Vec<N>, args: &QueryArgs) -> Self {
        let limit = usize::from(args.limit());
        let more = rows.len() > limit;
        rows.truncate(limit);

        if !args.is_backward() {
            let edges: Vec<Edge<N>> = rows.into_iter().map(Edge::from).collect();
            let end_cursor = edges.last().map(|edge| edge.cursor.clone());

            return QueryResult {
                edges,
                page_info: PageInfo {
                    has_next_page: more,
                    end_cursor,
                    ..PageInfo::default()
                },
            };
        }

        let edges: Vec<Edge<N>> = rows.into_iter().rev().map(Edge::from).collect();
        let start_cursor = edges.first().map(|edge| edge.cursor.clone());

        QueryResult {
            edges,
            page_info: PageInfo {
                has_previous_page: more,
                start_cursor,
                ..PageInfo::default()
            },
        }
    }
}

/// Relay style page request: `first`/`after` walks forward, `last`/`before`
/// walks backward. Any forward field wins over the backward ones.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct QueryArgs {
    pub first: Option<u16>,
    pub after: Option<CursorType>,
    pub last: Option<u16>,
    pub before: Option<CursorType>,
}

impl QueryArgs {
    pub fn forward(first: u16, after: Option<CursorType>) -> Self {
        Self {
            first: Some(first),
            after,
            ..Self::default()
        }
    }

    pub fn backward(last: u16, before: Option<CursorType>) -> Self {
        Self {
            last: Some(last),
            before,
            ..Self::default()
        }
    }

    pub fn is_backward(&self) -> bool {
        let forward = self.first.is_some() || self.after.is_some();
        let backward = self.last.is_some() || self.before.is_some();

        backward && !forward
    }

    /// Requested page size, 40 when unset.
    pub fn limit(&self) -> u16 {
        let requested = if self.is_backward() {
            self.last
        } else {
            self.first
        };

        requested.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn cursor(&self) -> Option<&CursorType> {
        match self.is_backward() {
            true => self.before.as_ref(),
            false => self.after.as_ref(),
        }
    }
}

/// Appends the keyset filter, ordering and limit for one page of `O`.
///
/// `has_where` tells whether the statement written so far already ends in a
/// `WHERE` clause the filter should extend. The limit is one more than
/// requested so [`QueryResult::from_rows`] can tell whether another page
/// follows.
pub fn push_page<O: Cursor>(
    builder: &mut CommandBuilder,
    args: &QueryArgs,
    order: &CursorOrder,
    has_where: bool,
) -> Result<(), QueryError> {
    let backward = args.is_backward();

    if let Some(cursor) = args.cursor() {
        let position = O::from_cursor(cursor)?;
        let joiner = match has_where {
            true => " AND (",
            false => " WHERE (",
        };

        builder.append(joiner);
        position.push_filter(builder, order, backward);
        builder.append(")");
    }

    builder.append(format!(
        " ORDER BY {} LIMIT {}",
        O::order_clause(order, backward),
        u32::from(args.limit()) + 1
    ));

    Ok(())
}
