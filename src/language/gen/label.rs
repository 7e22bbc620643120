use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::Display;
use std::rc::Rc;

/// All labels a single emission run produces, across every category.
/// Handing out the same label twice is a generator bug and panics.
#[derive(Clone, Default)]
pub struct LabelRegistry {
    used: Rc<RefCell<HashSet<String>>>,
}

impl LabelRegistry {
    pub fn labeller(&self, prefix: &str) -> Labeller {
        Labeller {
            prefix: prefix.to_string(),
            count: 0,
            used: Rc::clone(&self.used),
        }
    }
}

/// Mints labels under one category prefix. Numbered labels carry a wide
/// zero-padded counter so they sort in emission order.
pub struct Labeller {
    prefix: String,
    count: u64,
    used: Rc<RefCell<HashSet<String>>>,
}

impl Labeller {
    pub fn named(&self, suffix: impl Display) -> String {
        self.register(format!("{}_{}", self.prefix, suffix))
    }

    pub fn numbered(&mut self) -> String {
        let label = format!("{}_{:09}", self.prefix, self.count);
        self.count += 1;
        self.register(label)
    }

    pub fn numbered_with(&mut self, context: &str) -> String {
        let label = format!("{}_{}_{:09}", self.prefix, context, self.count);
        self.count += 1;
        self.register(label)
    }

    fn register(&self, label: String) -> String {
        if !self.used.borrow_mut().insert(label.clone()) {
            panic!("duplicate label generated: {}", label);
        }
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_labels_are_zero_padded() {
        let registry = LabelRegistry::default();
        let mut strings = registry.labeller("str");
        assert_eq!(strings.numbered(), "str_000000000");
        assert_eq!(strings.numbered(), "str_000000001");
    }

    #[test]
    fn contexts_share_the_category_counter() {
        let registry = LabelRegistry::default();
        let mut binops = registry.labeller("binop");
        assert_eq!(binops.numbered_with("and_false"), "binop_and_false_000000000");
        assert_eq!(binops.numbered_with("and_true"), "binop_and_true_000000001");
    }

    #[test]
    fn categories_count_independently() {
        let registry = LabelRegistry::default();
        let mut ifs = registry.labeller("if");
        let mut whiles = registry.labeller("while");
        assert_eq!(ifs.numbered_with("end"), "if_end_000000000");
        assert_eq!(whiles.numbered_with("begin"), "while_begin_000000000");
    }

    #[test]
    #[should_panic(expected = "duplicate label")]
    fn collisions_across_labellers_panic() {
        let registry = LabelRegistry::default();
        let funcs = registry.labeller("func");
        funcs.named("main_start");
        let clash = registry.labeller("func_main");
        clash.named("start");
    }
}
