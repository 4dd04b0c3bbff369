fn main() {
    wscene::run();
}
