use super::{quote_list, Apply};

/// Column subset, rendered as `[['a', 'b']]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub columns: Vec<String>,
}

impl Projection {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { columns: columns.into_iter().map(Into::into).collect() }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Apply for Projection {
    fn apply(&self, _relation: &str) -> String {
        format!("[{}]", quote_list(&self.columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_double_bracket_list() {
        let projection = Projection::new(["name", "age", "email"]);
        assert_eq!(projection.apply("customer"), "[['name', 'age', 'email']]");
        assert_eq!(projection.len(), 3);
    }
}
