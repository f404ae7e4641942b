fn main() {
    atlas_migrate::cli::run();
}
