use batch_dataloader::{batch_fn, Context, Loader};
use futures::executor::block_on;
use futures::TryFutureExt as _;

fn main() {
    let context = Context::new();
    let loader: Loader<i32, i32, _> = Loader::new(
        batch_fn(|keys: Vec<i32>| async move {
            println!("load batch {:?}", keys);
            Ok::<_, ()>(keys.iter().map(|v| v * 10).collect::<Vec<i32>>())
        }),
        &context,
    );

    let l1 = loader.clone();
    let v1 = loader
        .load(3)
        .and_then(move |v| l1.load_many(vec![v, v + 5, v + 10]));
    let l2 = loader.clone();
    let v2 = loader
        .load(4)
        .and_then(move |v| l2.load_many(vec![v, v + 5, v + 10]));
    let all = futures::future::try_join(v1, v2);
    let output = block_on(context.wait(all)).unwrap();
    let expected = (vec![300, 350, 400], vec![400, 450, 500]);
    assert_eq!(expected, output);
}
