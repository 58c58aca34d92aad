use std::fmt::Display;

#[macro_export]
macro_rules! o {
  ($x:expr $(,)?) => {
    ToOwned::to_owned($x)
  };
}

pub fn quote(x: impl Display) -> String {
  format!("\"{x}\"")
}
