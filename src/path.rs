use crate::{errors::*, Params};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path template: `/tests/:id` becomes `[Literal("tests"), Param("id")]`. Matching is
/// anchored on both ends and a parameter captures exactly one non-empty segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Path(Vec<Segment>);

impl Path {
    pub(crate) fn new(template: &str) -> Result<Self, Error> {
        let rest = match template.strip_prefix('/') {
            Some(rest) => rest,
            None => return Err(Error::invalid_template(template, "must start with '/'")),
        };

        // the root template has no segments at all.
        if rest.is_empty() {
            return Ok(Self(Vec::new()));
        }

        let mut parts = Vec::new();

        for arg in rest.split('/') {
            if arg.is_empty() {
                return Err(Error::invalid_template(
                    template,
                    "empty path segment (duplicate or trailing '/')",
                ));
            }

            if let Some(name) = arg.strip_prefix(':') {
                if name.is_empty() {
                    return Err(Error::invalid_template(
                        template,
                        "unterminated parameter token ':'",
                    ));
                }

                if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(Error::invalid_template(
                        template,
                        format!("invalid parameter name '{}'", name),
                    ));
                }

                if parts
                    .iter()
                    .any(|p| matches!(p, Segment::Param(existing) if existing == name))
                {
                    return Err(Error::invalid_template(
                        template,
                        format!("duplicate parameter '{}'", name),
                    ));
                }

                parts.push(Segment::Param(name.to_string()));
            } else if arg.contains(':') {
                return Err(Error::invalid_template(
                    template,
                    format!("parameter must span a whole segment in '{}'", arg),
                ));
            } else {
                parts.push(Segment::Literal(arg.to_string()));
            }
        }

        Ok(Self(parts))
    }

    /// Parameter names in declaration order.
    pub(crate) fn params(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|part| match part {
                Segment::Param(p) => Some(p.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Match a request path, returning the captured parameters. Values are the raw segments; no
    /// percent-decoding happens here.
    pub(crate) fn extract(&self, provided: &str) -> Option<Params> {
        let rest = provided.strip_prefix('/')?;

        let mut params = Params::default();
        let mut parts = self.0.iter();

        if !rest.is_empty() {
            for segment in rest.split('/') {
                match parts.next()? {
                    Segment::Literal(literal) => {
                        if literal != segment {
                            return None;
                        }
                    }
                    Segment::Param(name) => {
                        if segment.is_empty() {
                            return None;
                        }

                        params.insert(name.clone(), segment.to_string());
                    }
                }
            }
        }

        // anchored: a template with segments left over is not a match.
        if parts.next().is_some() {
            return None;
        }

        Some(params)
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }

        for part in &self.0 {
            match part {
                Segment::Literal(l) => write!(f, "/{}", l)?,
                Segment::Param(p) => write!(f, "/:{}", p)?,
            }
        }

        Ok(())
    }
}
