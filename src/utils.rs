#[derive(Debug, Clone, Default)]
pub struct NameGenerator {
    prefix: &'static str,
    next_id: usize,
}

impl NameGenerator {
    pub fn new(prefix: &'static str) -> Self {
        NameGenerator { prefix, next_id: 0 }
    }

    pub fn gen(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("{}{}", self.prefix, id)
    }
}
