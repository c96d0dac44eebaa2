use yak_box::runtime::profile::{resolve, PROFILE_NAMES};

#[test]
fn named_profiles_scale_up() {
    let light = resolve("light");
    let default = resolve("default");
    let heavy = resolve("heavy");
    assert!(light.cpu_share() < default.cpu_share());
    assert!(default.cpu_share() < heavy.cpu_share());
    assert!(light.memory_limit_bytes() < default.memory_limit_bytes());
    assert!(default.memory_limit_bytes() < heavy.memory_limit_bytes());
    assert!(light.pids < heavy.pids);
}

#[test]
fn ram_profile_is_unlimited_cpu_with_swap() {
    let ram = resolve("ram");
    assert!(ram.cpu_share().abs() < f64::EPSILON);
    assert_eq!(ram.memory, "8g");
    assert_eq!(ram.swap, Some("16g"));
}

#[test]
fn unknown_name_falls_back_to_default() {
    assert_eq!(resolve("gigantic"), resolve("default"));
    assert_eq!(resolve("").name, "default");
}

#[test]
fn every_profile_mounts_tmp_and_home() {
    for name in PROFILE_NAMES {
        let profile = resolve(name);
        assert_eq!(profile.name, name);
        assert!(profile.tmpfs.contains_key("/tmp"), "{name}");
        assert!(profile.tmpfs.contains_key("/home/yak-shaver"), "{name}");
    }
}
