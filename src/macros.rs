macro_rules! strings {
    ($($value:expr),* $(,)?) => {
        vec![$(::std::string::String::from($value)),*]
    };
}
