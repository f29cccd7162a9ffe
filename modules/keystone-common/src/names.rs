/// Last path segment of a type's name, generics included.
///
/// `keystone_app::states::MenuState` becomes `MenuState`, and
/// `alloc::vec::Vec<u8>` becomes `Vec<u8>`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    #[test]
    fn strips_module_path() {
        assert_eq!(short_type_name::<Plain>(), "Plain");
    }

    #[test]
    fn keeps_generic_arguments() {
        assert!(short_type_name::<Vec<u8>>().starts_with("Vec<"));
    }

    #[test]
    fn primitive_names_pass_through() {
        assert_eq!(short_type_name::<u32>(), "u32");
    }
}
