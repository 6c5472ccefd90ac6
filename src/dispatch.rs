//! Upstream selection and domain remapping.
//!
//! A query's first question name is first checked against the remap table. At most one remap
//! is applied, and the route table is consulted with the remapped name. Queries that match no
//! route go to the default upstream.

use crate::config::Shared;
use crate::error::Error;
use crate::suffix::Suffix;
use trust_dns_proto::op::Message;
use trust_dns_proto::rr::Name;

/// A remap that was applied to a query, kept so the answer can be rewritten back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    pub src: Suffix,
    pub dst: Name,
}

impl Remap {
    /// Rewrite the first question name and every answer owner name of an upstream response that
    /// falls under the remap destination back under the remap source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if a rewritten name would be too long.
    pub fn restore_response(&self, response: &mut Message) -> Result<(), Error> {
        let dst = Suffix::new(self.dst.clone());
        let src = self.src.name();

        let mut queries = response.take_queries();
        if let Some(question) = queries.first_mut() {
            if let Some(name) = dst.replace(question.name(), src)? {
                question.set_name(name);
            }
        }
        response.add_queries(queries);

        let mut answers = response.take_answers();
        for record in &mut answers {
            if let Some(name) = dst.replace(record.name(), src)? {
                record.set_name(name);
            }
        }
        response.add_answers(answers);
        Ok(())
    }
}

/// The outcome of dispatching a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Upstream `host:port` the query is forwarded to.
    pub upstream: String,
    /// The first question name as it should be sent upstream.
    pub name: Name,
    pub remap: Option<Remap>,
}

impl Route {
    /// Set the first question name of `query` to the remapped name, if a remap applied.
    pub fn rewrite_query(&self, query: &mut Message) {
        if self.remap.is_none() {
            return;
        }
        let mut queries = query.take_queries();
        if let Some(question) = queries.first_mut() {
            question.set_name(self.name.clone());
        }
        query.add_queries(queries);
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    config: Shared,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: Shared) -> Self {
        Dispatcher { config }
    }

    /// Pick the upstream for `query` and the remap (if any) that applies to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedQuery`] if the query has no question, or [`Error::DNSError`] if
    /// the remapped name would be too long.
    pub fn route(&self, query: &Message) -> Result<Route, Error> {
        let question = query.queries().first().ok_or(Error::MalformedQuery)?;
        let mut name = question.name().clone();

        let mut remap = None;
        if let Some((src, dst)) = self.config.remaps.lookup(&name) {
            if let Some(remapped) = src.replace(&name, dst)? {
                name = remapped;
                remap = Some(Remap {
                    src: src.clone(),
                    dst: dst.clone(),
                });
            }
        }

        let upstream = match self.config.routes.lookup(&name) {
            Some((_, upstream)) => upstream.clone(),
            None => self.config.default_upstream.clone(),
        };

        Ok(Route {
            upstream,
            name,
            remap,
        })
    }
}
